use std::collections::BTreeMap;

use habitat_core::error::HabitatError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::sync::Mutex;

/// Bytes that `escape` leaves untouched, the usual URL-safe set.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a string for use in a URL path or query component. Pure
/// and stateless, so it doesn't need its own handle just to escape a string.
pub fn escape(s: &str) -> String {
    utf8_percent_encode(s, UNRESERVED).to_string()
}

/// Percent-encode `options` and join as `k=v&k=v&...`, iterating keys in
/// sorted order for a stable, reproducible query string. When
/// `leading_qmark` is set the result is prefixed with `?` (empty if
/// `options` is empty).
pub fn query_string(options: &BTreeMap<String, String>, leading_qmark: bool) -> String {
    if options.is_empty() {
        return String::new();
    }

    let joined = options
        .iter()
        .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
        .collect::<Vec<_>>()
        .join("&");

    if leading_qmark {
        format!("?{joined}")
    } else {
        joined
    }
}

/// Thin wrapper around `reqwest::Client` that serializes every request on a
/// single mutex, so the underlying connection pool is never asked to juggle
/// concurrent requests from this process. Translates transport failures and
/// non-2xx statuses into `HabitatError`; callers that need to special-case a
/// status (e.g. 409 on a document PUT) match on `HabitatError::HttpStatus`.
pub struct HttpClient {
    client: reqwest::Client,
    lock: Mutex<()>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            lock: Mutex::new(()),
        }
    }

    pub async fn get(&self, url: &str) -> Result<String, HabitatError> {
        let _guard = self.lock.lock().await;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport("GET", &e))?;
        read_body(resp, url).await
    }

    pub async fn post(&self, url: &str, body: String) -> Result<String, HabitatError> {
        let _guard = self.lock.lock().await;
        let resp = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| transport("POST", &e))?;
        read_body(resp, url).await
    }

    pub async fn put(&self, url: &str, body: String) -> Result<String, HabitatError> {
        let _guard = self.lock.lock().await;
        let resp = self
            .client
            .put(url)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| transport("PUT", &e))?;
        read_body(resp, url).await
    }
}

fn transport(op: &str, e: &reqwest::Error) -> HabitatError {
    HabitatError::Transport {
        op: op.to_string(),
        detail: e.to_string(),
    }
}

async fn read_body(resp: reqwest::Response, url: &str) -> Result<String, HabitatError> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| transport("read body", &e))?;

    if status.is_success() {
        Ok(body)
    } else {
        Err(HabitatError::HttpStatus {
            code: status.as_u16(),
            url: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_leaves_unreserved_alone() {
        assert_eq!(escape("abc-._~XYZ0"), "abc-._~XYZ0");
    }

    #[test]
    fn escape_encodes_reserved_bytes() {
        assert_eq!(escape("a b/c"), "a%20b%2Fc");
    }

    #[test]
    fn query_string_sorts_keys() {
        let mut options = BTreeMap::new();
        options.insert("b".to_string(), "2".to_string());
        options.insert("a".to_string(), "1".to_string());
        assert_eq!(query_string(&options, false), "a=1&b=2");
        assert_eq!(query_string(&options, true), "?a=1&b=2");
    }

    #[test]
    fn query_string_empty_is_empty() {
        assert_eq!(query_string(&BTreeMap::new(), true), "");
    }
}
