use thiserror::Error;

/// Error taxonomy for the whole connector. `Conflict` is recovered locally
/// inside the uploader's merge loop; every other variant surfaces to the
/// worker, which logs it and moves on to the next queued action.
#[derive(Debug, Error)]
pub enum HabitatError {
    /// Caller violated a precondition (empty callsign, forbidden metadata
    /// key, non-object data, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Server response shape was not what we expected (bad JSON, missing
    /// field, wrong id echoed back, non-array uuids).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Non-2xx HTTP status from the store, excluding 409 on a document PUT.
    #[error("http status {code} from {url}")]
    HttpStatus { code: u16, url: String },

    /// The underlying HTTP client failed below the status-code layer.
    #[error("transport error during {op}: {detail}")]
    Transport { op: String, detail: String },

    /// HTTP 409 from a document PUT. Used as a control signal inside the
    /// uploader's merge loop; never meant to reach the worker.
    #[error("conflict saving document {doc_id}")]
    Conflict { doc_id: String },

    /// The same `_id` exists server-side with different `data._raw`.
    #[error("collision on document {doc_id}: raw data differs from ours")]
    Collision { doc_id: String },

    /// The conflict-retry budget was exhausted without converging.
    #[error("could not merge document {doc_id} after {attempts} attempts")]
    Unmergeable { doc_id: String, attempts: u32 },
}

impl HabitatError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// `true` for preconditions the caller violated (used by the worker to
    /// pick between `caught_exception_invalid` and `caught_exception_runtime`).
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}
