use std::sync::Arc;

use habitat_extractor::{Extractor, ExtractorManager, PayloadConfiguration, PushFlags};
use habitat_uploader::{UploaderWorker, WorkerCallbacks};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Wires an [`ExtractorManager`]'s callbacks onto the uploader's action
/// queue and `tracing`.
pub struct Connector {
    manager: ExtractorManager,
}

impl Connector {
    pub fn new(worker: Arc<UploaderWorker>, receiver_metadata: Value) -> Self {
        let manager = ExtractorManager::new(
            |msg| debug!(target: "habitat::extractor", "{msg}"),
            |value| info!(target: "habitat::extractor", %value, "parsed sentence"),
            move |raw| worker.payload_telemetry(raw, receiver_metadata.clone(), -1),
        );
        Self { manager }
    }

    pub fn add(&self, extractor: Box<dyn Extractor>) {
        self.manager.add(extractor);
    }

    pub fn set_payload_config(&self, cfg: Option<PayloadConfiguration>) {
        self.manager.payload(cfg);
    }

    pub fn push(&self, byte: u8, flags: PushFlags) {
        self.manager.push(byte, flags);
    }

    pub fn skipped(&self, n: u32) {
        self.manager.skipped(n);
    }
}

/// Logs every uploader lifecycle event through `tracing` instead of acting
/// on it; a host wanting to react (e.g. surface flights in a UI) overrides
/// these via its own [`WorkerCallbacks`] impl instead of this one.
pub struct TracingCallbacks;

impl WorkerCallbacks for TracingCallbacks {
    fn initialised(&self) {
        info!("uploader initialised");
    }

    fn reset_done(&self) {
        info!("uploader reset");
    }

    fn saved_id(&self, doc_type: &str, id: &str) {
        info!(doc_type, id, "saved document");
    }

    fn got_flights(&self, flights: &[Value]) {
        info!(count = flights.len(), "received flight list");
    }

    fn caught_exception_invalid(&self, what: &str) {
        warn!(%what, "rejected action");
    }

    fn caught_exception_runtime(&self, what: &str) {
        warn!(%what, "action failed");
    }
}
