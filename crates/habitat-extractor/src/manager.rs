use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::config::PayloadConfiguration;
use crate::extractor::Extractor;
use crate::sink::{PushFlags, Sink};

struct ManagerState {
    extractors: Vec<Box<dyn Extractor>>,
    payload_config: Option<Arc<PayloadConfiguration>>,
}

/// Owns the registered extractors and the current payload configuration,
/// fanning out bytes and skip notifications to every extractor and
/// forwarding their callbacks to whatever the host wired up.
///
/// All four public operations (`add`, `payload`, `push`, `skipped`) share a
/// single mutex.
pub struct ExtractorManager {
    state: Mutex<ManagerState>,
    status_cb: Box<dyn Fn(&str) + Send + Sync>,
    data_cb: Box<dyn Fn(Value) + Send + Sync>,
    raw_sentence_cb: Box<dyn Fn(Vec<u8>) + Send + Sync>,
}

impl ExtractorManager {
    pub fn new(
        status_cb: impl Fn(&str) + Send + Sync + 'static,
        data_cb: impl Fn(Value) + Send + Sync + 'static,
        raw_sentence_cb: impl Fn(Vec<u8>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            state: Mutex::new(ManagerState {
                extractors: Vec::new(),
                payload_config: None,
            }),
            status_cb: Box::new(status_cb),
            data_cb: Box::new(data_cb),
            raw_sentence_cb: Box::new(raw_sentence_cb),
        }
    }

    pub fn add(&self, extractor: Box<dyn Extractor>) {
        self.state.lock().unwrap().extractors.push(extractor);
    }

    /// Atomically replace the current payload configuration. `None` clears
    /// it, falling back to checksum-only validation.
    pub fn payload(&self, cfg: Option<PayloadConfiguration>) {
        self.state.lock().unwrap().payload_config = cfg.map(Arc::new);
    }

    pub fn push(&self, byte: u8, flags: PushFlags) {
        let mut state = self.state.lock().unwrap();
        let cfg = state.payload_config.clone();
        for extractor in state.extractors.iter_mut() {
            extractor.push(byte, flags, cfg.as_deref(), self);
        }
    }

    pub fn skipped(&self, n: u32) {
        let mut state = self.state.lock().unwrap();
        let cfg = state.payload_config.clone();
        for extractor in state.extractors.iter_mut() {
            extractor.skipped(n, cfg.as_deref(), self);
        }
    }
}

impl Sink for ExtractorManager {
    fn status(&self, msg: &str) {
        (self.status_cb)(msg);
    }

    fn data(&self, value: Value) {
        (self.data_cb)(value);
    }

    fn payload_telemetry(&self, data: Vec<u8>) {
        (self.raw_sentence_cb)(data);
    }
}
