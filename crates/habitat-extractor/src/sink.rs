use serde_json::Value;

/// The side effects an extractor can have, decoupled from how the manager
/// actually wires them up (a `tracing` event, an upload action, ...).
pub trait Sink {
    fn status(&self, msg: &str);
    fn data(&self, value: Value);
    fn payload_telemetry(&self, data: Vec<u8>);
}

/// Flags accompanying a single pushed byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PushFlags {
    /// Substitute `#` for `*` — needed on baudot-restricted links that
    /// can't carry `*`.
    pub baudot_hack: bool,
}

impl PushFlags {
    pub const NONE: PushFlags = PushFlags { baudot_hack: false };
    pub const BAUDOT_HACK: PushFlags = PushFlags { baudot_hack: true };
}
