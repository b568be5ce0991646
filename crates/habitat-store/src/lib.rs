pub mod couch;
pub mod http;

pub use couch::{Database, Server};
pub use http::HttpClient;
