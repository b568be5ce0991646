pub mod callbacks;
pub mod uploader;
pub mod worker;

pub use callbacks::{LoggingCallbacks, WorkerCallbacks};
pub use uploader::Uploader;
pub use worker::UploaderWorker;
