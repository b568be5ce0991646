use serde_json::Value;

/// The expected-sentence descriptor(s) an extractor validates a frame
/// against. Deliberately kept as a thin view over a raw JSON document
/// rather than a strict struct: the crude parse only ever reads a handful
/// of well-known keys and tolerates anything else being present.
#[derive(Debug, Clone)]
pub struct PayloadConfiguration {
    raw: Value,
}

impl PayloadConfiguration {
    pub fn from_value(raw: Value) -> Self {
        Self { raw }
    }

    pub fn callsign(&self) -> Option<&str> {
        self.raw.get("payload").and_then(Value::as_str)
    }

    /// The sentence descriptors to attempt the crude parse against.
    ///
    /// `cfg.sentence` is the source of descriptors whenever present (an
    /// array of descriptors, or a single descriptor object). When absent,
    /// the configuration's top level is treated as a single descriptor —
    /// that's the more permissive choice over always requiring a `sentence`
    /// wrapper.
    pub fn descriptors(&self) -> Vec<&Value> {
        match self.raw.get("sentence") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(obj @ Value::Object(_)) => vec![obj],
            _ => vec![&self.raw],
        }
    }
}
