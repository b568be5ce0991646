use crate::buffer::SentenceBuffer;
use crate::config::PayloadConfiguration;
use crate::extractor::Extractor;
use crate::parse::crude_parse;
use crate::sink::{PushFlags, Sink};
use serde_json::{Map, Value};

/// Sentences accumulate more than this many out-of-printable-range bytes
/// before the frame is abandoned as garbage.
const GARBAGE_LIMIT: u32 = 16;

/// Byte-level state machine that frames UKHAS sentences out of a noisy
/// stream: `$$` starts a frame, `\n` ends it, and anything too long or too
/// garbled in between is abandoned.
#[derive(Debug, Default)]
pub struct UkhasExtractor {
    extracting: bool,
    last: u8,
    buffer: SentenceBuffer,
    garbage_count: u32,
}

impl UkhasExtractor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Extractor for UkhasExtractor {
    fn push(
        &mut self,
        byte: u8,
        flags: PushFlags,
        cfg: Option<&PayloadConfiguration>,
        sink: &dyn Sink,
    ) {
        let stored = if self.last == b'$' && byte == b'$' {
            self.buffer.reset();
            self.buffer.push(self.last);
            self.buffer.push(byte);
            self.garbage_count = 0;
            self.extracting = true;
            sink.status("UKHAS Extractor: found start delimiter");
            byte
        } else if self.extracting && byte == b'\n' {
            self.buffer.push(byte);
            sink.payload_telemetry(self.buffer.to_vec());
            sink.status("UKHAS Extractor: extracted string");

            match crude_parse(self.buffer.as_slice(), cfg) {
                Ok(outcome) => {
                    for err in &outcome.candidate_errors {
                        sink.status(&format!("UKHAS Extractor: {err}"));
                    }
                    sink.data(outcome.value);
                }
                Err(e) => {
                    sink.status(&format!("UKHAS Extractor: crude parse failed: {e}"));
                    let mut bare = Map::new();
                    bare.insert(
                        "_sentence".to_string(),
                        Value::String(String::from_utf8_lossy(self.buffer.as_slice()).into_owned()),
                    );
                    sink.data(Value::Object(bare));
                }
            }

            self.buffer.reset();
            self.extracting = false;
            byte
        } else if self.extracting {
            let byte = if flags.baudot_hack && byte == b'#' {
                b'*'
            } else {
                byte
            };

            self.buffer.push(byte);
            if !(0x20..=0x7E).contains(&byte) {
                self.garbage_count += 1;
            }

            if self.buffer.overflowed() || self.garbage_count > GARBAGE_LIMIT {
                sink.status("UKHAS Extractor: giving up");
                self.buffer.reset();
                self.extracting = false;
            }
            byte
        } else {
            byte
        };

        self.last = stored;
    }
}
