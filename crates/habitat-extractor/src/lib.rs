pub mod buffer;
pub mod checksum;
pub mod config;
pub mod extractor;
pub mod manager;
pub mod parse;
pub mod sink;
pub mod ukhas;

pub use config::PayloadConfiguration;
pub use extractor::Extractor;
pub use manager::ExtractorManager;
pub use sink::{PushFlags, Sink};
pub use ukhas::UkhasExtractor;
