use serde_json::Value;
use tracing::{info, warn};

/// Lifecycle hooks the worker invokes around each action. All have a
/// logging default; override to react to uploads (e.g. to surface them in a
/// UI) without touching the worker loop itself.
pub trait WorkerCallbacks: Send + Sync {
    fn initialised(&self) {
        info!("initialised uploader");
    }

    fn reset_done(&self) {
        info!("reset uploader");
    }

    fn saved_id(&self, doc_type: &str, id: &str) {
        info!(doc_type, id, "saved document");
    }

    /// Default action: discard. Override to act on the flight list.
    fn got_flights(&self, flights: &[Value]) {
        info!(count = flights.len(), "got flights; discarding");
    }

    fn caught_exception_invalid(&self, what: &str) {
        warn!(%what, "caught invalid argument");
    }

    fn caught_exception_runtime(&self, what: &str) {
        warn!(%what, "caught runtime error");
    }
}

/// Logs every hook and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCallbacks;

impl WorkerCallbacks for LoggingCallbacks {}
