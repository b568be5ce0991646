/// Initial reservation for a fresh frame. Not a hard limit — see
/// [`HARD_LIMIT`].
pub const CAPACITY_HINT: usize = 256;

/// A sentence may never grow past this many bytes; exceeding it while still
/// `extracting` terminates the frame without emitting anything.
pub const HARD_LIMIT: usize = 1000;

/// The growable byte buffer backing one in-progress sentence frame.
#[derive(Debug, Default)]
pub struct SentenceBuffer {
    bytes: Vec<u8>,
}

impl SentenceBuffer {
    pub fn new() -> Self {
        Self {
            bytes: Vec::with_capacity(CAPACITY_HINT),
        }
    }

    pub fn reset(&mut self) {
        self.bytes.clear();
        self.bytes.reserve(CAPACITY_HINT);
    }

    pub fn push(&mut self, b: u8) {
        self.bytes.push(b);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn overflowed(&self) -> bool {
        self.bytes.len() > HARD_LIMIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_but_keeps_capacity_hint() {
        let mut buf = SentenceBuffer::new();
        for b in b"$$TEST,1*07\n" {
            buf.push(*b);
        }
        assert_eq!(buf.len(), 12);
        buf.reset();
        assert!(buf.is_empty());
    }

    #[test]
    fn overflow_triggers_past_hard_limit() {
        let mut buf = SentenceBuffer::new();
        for _ in 0..HARD_LIMIT {
            buf.push(b'x');
        }
        assert!(!buf.overflowed());
        buf.push(b'x');
        assert!(buf.overflowed());
    }
}
