use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use habitat_core::error::HabitatError;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::http::{HttpClient, escape, query_string};

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

/// A document-store endpoint plus its own UUID prefetch cache. The cache is
/// refilled one HTTP round-trip at a time whenever it runs dry; its mutex is
/// independent of the HTTP client's so a UUID fetch and, say, a concurrent
/// `get_doc` don't serialize on each other's bookkeeping (only the
/// underlying HTTP client itself serializes requests).
pub struct Server {
    url: String,
    http: HttpClient,
    uuid_cache: Mutex<VecDeque<String>>,
}

impl Server {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: with_trailing_slash(&url.into()),
            http: HttpClient::new(),
            uuid_cache: Mutex::new(VecDeque::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Pop a prefetched UUID, refilling from `_uuids?count=100` when empty.
    /// Only ever called from the single uploader worker, so holding this
    /// mutex across the refill's HTTP call is safe.
    pub async fn next_uuid(&self) -> Result<String, HabitatError> {
        let mut cache = self.uuid_cache.lock().await;

        if let Some(uuid) = cache.pop_front() {
            return Ok(uuid);
        }

        let url = format!("{}_uuids?count=100", self.url);
        let body = self.http.get(&url).await?;
        let root: Value = serde_json::from_str(&body)
            .map_err(|e| HabitatError::protocol(format!("JSON parsing error: {e}")))?;

        let uuids = root
            .get("uuids")
            .and_then(Value::as_array)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| HabitatError::protocol("invalid uuids response"))?;

        let mut uuids = uuids.iter();
        let first = uuids
            .next()
            .and_then(Value::as_str)
            .ok_or_else(|| HabitatError::protocol("invalid uuids response"))?
            .to_string();

        for v in uuids {
            if let Some(s) = v.as_str() {
                cache.push_back(s.to_string());
            }
        }

        Ok(first)
    }
}

/// A single database on a `Server`.
pub struct Database {
    server: Arc<Server>,
    url: String,
}

impl Database {
    pub fn new(server: Arc<Server>, db: &str) -> Self {
        let url = format!("{}{}/", server.url(), escape(db));
        Self { server, url }
    }

    pub async fn get_doc(&self, id: &str) -> Result<Value, HabitatError> {
        let url = format!("{}{}", self.url, escape(id));
        let body = self.server.http().get(&url).await?;
        serde_json::from_str(&body)
            .map_err(|e| HabitatError::protocol(format!("JSON parsing error: {e}")))
    }

    /// Save `doc`, assigning a server UUID if `_id` is absent, and writing
    /// the server-assigned `_rev` back into `doc` on success. HTTP 409 is
    /// translated into `HabitatError::Conflict`.
    pub async fn save_doc(&self, doc: &mut Value) -> Result<(), HabitatError> {
        if doc.get("_id").is_none_or(Value::is_null) {
            let uuid = self.server.next_uuid().await?;
            doc["_id"] = Value::String(uuid);
        }

        let doc_id = doc
            .get("_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty() && !s.starts_with('_'))
            .ok_or_else(|| {
                HabitatError::invalid_argument(
                    "_id must be a non-empty string not starting with '_'",
                )
            })?
            .to_string();

        let url = format!("{}{}", self.url, escape(&doc_id));
        let json_doc = serde_json::to_string(doc)
            .map_err(|e| HabitatError::protocol(format!("failed to serialize document: {e}")))?;

        debug!(doc_id = %doc_id, "saving document");

        let body = match self.server.http().put(&url, json_doc).await {
            Ok(body) => body,
            Err(HabitatError::HttpStatus { code: 409, .. }) => {
                return Err(HabitatError::Conflict { doc_id });
            }
            Err(e) => return Err(e),
        };

        let info: Value = serde_json::from_str(&body)
            .map_err(|e| HabitatError::protocol(format!("JSON parsing error: {e}")))?;

        let new_id = info
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| HabitatError::protocol("invalid server response (missing id)"))?;
        let new_rev = info
            .get("rev")
            .and_then(Value::as_str)
            .ok_or_else(|| HabitatError::protocol("invalid server response (missing rev)"))?;

        if new_id != doc_id {
            return Err(HabitatError::protocol(
                "server echoed back a different _id than requested",
            ));
        }

        doc["_rev"] = Value::String(new_rev.to_string());
        Ok(())
    }

    pub async fn view(
        &self,
        design_doc: &str,
        view_name: &str,
        options: &BTreeMap<String, String>,
    ) -> Result<Value, HabitatError> {
        let qs = query_string(options, true);
        let url = if design_doc.is_empty() {
            format!("{}{}{}", self.url, view_name, qs)
        } else {
            format!(
                "{}_design/{}/_view/{}{}",
                self.url,
                escape(design_doc),
                view_name,
                qs
            )
        };

        let body = self.server.http().get(&url).await?;
        serde_json::from_str(&body)
            .map_err(|e| HabitatError::protocol(format!("JSON parsing error: {e}")))
    }
}
