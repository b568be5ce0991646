use serde_json::Value;

/// Work items accepted by the uploader's action queue. Each variant carries
/// its own immutable payload; the worker consumes and destroys them strictly
/// in submission order. No variant implies cross-action state beyond what
/// the `Uploader` itself tracks (the two `latest_*` document ids).
#[derive(Debug, Clone)]
pub enum Action {
    /// (Re)initialise the uploader. Any previously live uploader is dropped;
    /// no partial state survives across this boundary.
    Settings {
        callsign: String,
        couch_uri: String,
        couch_db: String,
        max_merge_attempts: u32,
    },
    /// Destroy the current uploader, returning the worker to an
    /// uninitialised state.
    Reset,
    /// Publish a framed sentence's raw bytes plus receiver metadata.
    PayloadTelemetry {
        data: Vec<u8>,
        metadata: Value,
        time_created: i64,
    },
    /// Publish a listener_telemetry document for this station.
    ListenerTelemetry { data: Value, time_created: i64 },
    /// Publish a listener_info document for this station.
    ListenerInfo { data: Value, time_created: i64 },
    /// Fetch the current set of flight/payload configurations.
    Flights,
    /// Stop the worker. Anything queued after this is never run.
    Shutdown,
}

impl Action {
    /// One-line description suitable for a `tracing` event, mirroring the
    /// debug-dump.
    pub fn describe(&self) -> String {
        match self {
            Action::Settings {
                callsign,
                couch_uri,
                couch_db,
                max_merge_attempts,
            } => format!(
                "Settings('{callsign}', '{couch_uri}', '{couch_db}', {max_merge_attempts})"
            ),
            Action::Reset => "Reset".to_string(),
            Action::PayloadTelemetry {
                data,
                metadata,
                time_created,
            } => format!(
                "PayloadTelemetry({} bytes, {}, {})",
                data.len(),
                metadata,
                time_created
            ),
            Action::ListenerTelemetry { data, time_created } => {
                format!("ListenerTelemetry({data}, {time_created})")
            }
            Action::ListenerInfo { data, time_created } => {
                format!("ListenerInfo({data}, {time_created})")
            }
            Action::Flights => "Flights".to_string(),
            Action::Shutdown => "Shutdown".to_string(),
        }
    }
}
