use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use habitat_core::error::HabitatError;
use habitat_store::{Database, Server};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

const FORBIDDEN_RECEIVER_KEYS: [&str; 4] = [
    "time_created",
    "time_uploaded",
    "latest_listener_info",
    "latest_listener_telemetry",
];

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(digest)
}

fn set_time(receiver_info: &mut Map<String, Value>, time_created: i64) {
    receiver_info.insert("time_created".to_string(), Value::from(time_created));
    receiver_info.insert("time_uploaded".to_string(), Value::from(now()));
}

struct UploaderState {
    latest_listener_info: Option<String>,
    latest_listener_telemetry: Option<String>,
}

impl UploaderState {
    fn apply_latest(&self, receiver_info: &mut Map<String, Value>) {
        if let Some(id) = &self.latest_listener_info {
            receiver_info.insert("latest_listener_info".to_string(), Value::String(id.clone()));
        }
        if let Some(id) = &self.latest_listener_telemetry {
            receiver_info.insert(
                "latest_listener_telemetry".to_string(),
                Value::String(id.clone()),
            );
        }
    }
}

/// Publishes listener and payload-telemetry documents into a CouchDB-style
/// document store, merging concurrent receptions of the same raw sentence
/// via optimistic-concurrency retries.
///
/// All three public operations serialize on `state`, held for the whole
/// operation — the `latest_*` ids are always read fresh for the call in
/// progress, never cached across a merge loop's attempts.
pub struct Uploader {
    callsign: String,
    database: Database,
    max_merge_attempts: u32,
    state: Mutex<UploaderState>,
}

impl Uploader {
    pub fn new(
        callsign: impl Into<String>,
        couch_uri: impl Into<String>,
        couch_db: &str,
        max_merge_attempts: u32,
    ) -> Result<Self, HabitatError> {
        let callsign = callsign.into();
        if callsign.is_empty() {
            return Err(HabitatError::invalid_argument("callsign of zero length"));
        }

        let server = Arc::new(Server::new(couch_uri.into()));
        let database = Database::new(server, couch_db);

        Ok(Self {
            callsign,
            database,
            max_merge_attempts,
            state: Mutex::new(UploaderState {
                latest_listener_info: None,
                latest_listener_telemetry: None,
            }),
        })
    }

    async fn listener_doc(
        &self,
        doc_type: &str,
        data: Value,
        time_created: i64,
    ) -> Result<String, HabitatError> {
        let mut data = match data {
            Value::Object(map) => map,
            _ => return Err(HabitatError::invalid_argument("data must be an object")),
        };

        if data.contains_key("callsign") {
            return Err(HabitatError::invalid_argument("forbidden key in data"));
        }
        data.insert("callsign".to_string(), Value::String(self.callsign.clone()));

        let time_created = if time_created == -1 { now() } else { time_created };

        let mut doc = Value::Object(Map::new());
        doc["type"] = Value::String(doc_type.to_string());
        doc["data"] = Value::Object(data);
        doc["time_created"] = Value::from(time_created);
        doc["time_uploaded"] = Value::from(now());

        self.database.save_doc(&mut doc).await?;

        doc.get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| HabitatError::protocol("save_doc did not assign an _id"))
    }

    pub async fn listener_info(&self, data: Value, time_created: i64) -> Result<String, HabitatError> {
        let mut state = self.state.lock().await;
        let id = self.listener_doc("listener_info", data, time_created).await?;
        state.latest_listener_info = Some(id.clone());
        Ok(id)
    }

    pub async fn listener_telemetry(
        &self,
        data: Value,
        time_created: i64,
    ) -> Result<String, HabitatError> {
        let mut state = self.state.lock().await;
        let id = self
            .listener_doc("listener_telemetry", data, time_created)
            .await?;
        state.latest_listener_telemetry = Some(id.clone());
        Ok(id)
    }

    fn build_receiver_info(metadata: &Value) -> Result<Map<String, Value>, HabitatError> {
        match metadata {
            Value::Null => Ok(Map::new()),
            Value::Object(map) => {
                for key in FORBIDDEN_RECEIVER_KEYS {
                    if map.contains_key(key) {
                        return Err(HabitatError::invalid_argument(format!(
                            "found forbidden key {key} in metadata"
                        )));
                    }
                }
                Ok(map.clone())
            }
            _ => Err(HabitatError::invalid_argument(
                "metadata must be an object or null",
            )),
        }
    }

    pub async fn payload_telemetry(
        &self,
        data: &[u8],
        metadata: Value,
        time_created: i64,
    ) -> Result<String, HabitatError> {
        if data.is_empty() {
            return Err(HabitatError::invalid_argument(
                "can't upload string of zero length",
            ));
        }

        let state = self.state.lock().await;

        let doc_id = sha256_hex(data);
        let data_b64 = BASE64.encode(data);
        let time_created = if time_created == -1 { now() } else { time_created };

        let base_receiver_info = Self::build_receiver_info(&metadata)?;

        debug!(doc_id = %doc_id, callsign = %self.callsign, "uploading payload telemetry");

        let mut receiver_info = base_receiver_info.clone();
        set_time(&mut receiver_info, time_created);
        state.apply_latest(&mut receiver_info);

        let mut raw_data = Map::new();
        raw_data.insert("_raw".to_string(), Value::String(data_b64.clone()));

        let mut receivers = Map::new();
        receivers.insert(self.callsign.clone(), Value::Object(receiver_info));

        let mut doc = Map::new();
        doc.insert("_id".to_string(), Value::String(doc_id.clone()));
        doc.insert("type".to_string(), Value::String("payload_telemetry".to_string()));
        doc.insert("data".to_string(), Value::Object(raw_data));
        doc.insert("receivers".to_string(), Value::Object(receivers));
        let mut doc = Value::Object(doc);

        match self.database.save_doc(&mut doc).await {
            Ok(()) => return Ok(doc_id),
            Err(HabitatError::Conflict { .. }) => {}
            Err(e) => return Err(e),
        }

        for _ in 0..self.max_merge_attempts {
            let mut doc = self.database.get_doc(&doc_id).await?;

            let other_b64 = doc
                .get("data")
                .and_then(|d| d.get("_raw"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if other_b64.is_empty() || other_b64 != data_b64 {
                return Err(HabitatError::Collision {
                    doc_id: doc_id.clone(),
                });
            }
            if !doc.get("receivers").is_some_and(Value::is_object) {
                return Err(HabitatError::protocol(
                    "server gave us an invalid payload telemetry doc",
                ));
            }

            let mut receiver_info = base_receiver_info.clone();
            set_time(&mut receiver_info, time_created);
            state.apply_latest(&mut receiver_info);
            doc.get_mut("receivers")
                .and_then(Value::as_object_mut)
                .expect("checked above that receivers is an object")
                .insert(self.callsign.clone(), Value::Object(receiver_info));

            match self.database.save_doc(&mut doc).await {
                Ok(()) => return Ok(doc_id),
                Err(HabitatError::Conflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(HabitatError::Unmergeable {
            doc_id,
            attempts: self.max_merge_attempts,
        })
    }

    pub async fn flights(&self) -> Result<Vec<Value>, HabitatError> {
        let result = self
            .database
            .view("flight", "payload_configs", &Default::default())
            .await?;

        let rows = result
            .get("rows")
            .and_then(Value::as_array)
            .ok_or_else(|| HabitatError::protocol("invalid view response (missing rows)"))?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get("value").cloned())
            .collect())
    }
}
