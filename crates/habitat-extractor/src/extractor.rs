use crate::config::PayloadConfiguration;
use crate::sink::{PushFlags, Sink};

/// A single framer/parser plugged into the manager. `skipped` has a default
/// implementation in terms of `push` (equivalent to pushing `n` NUL bytes),
/// equivalent to pushing `n` NUL bytes one at a time.
pub trait Extractor: Send {
    fn push(&mut self, byte: u8, flags: PushFlags, cfg: Option<&PayloadConfiguration>, sink: &dyn Sink);

    /// `n` lost bytes, clamped to 20 (the newer of the two historical
    /// clamp.
    fn skipped(&mut self, n: u32, cfg: Option<&PayloadConfiguration>, sink: &dyn Sink) {
        for _ in 0..n.min(20) {
            self.push(0, PushFlags::NONE, cfg, sink);
        }
    }
}
