use std::collections::VecDeque;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use habitat_uploader::{Uploader, UploaderWorker, WorkerCallbacks};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Minimal HTTP/1.1 responder playing back a fixed script of `(status,
/// body)` pairs in connection order.
struct StubServer {
    addr: std::net::SocketAddr,
}

impl StubServer {
    async fn start(responses: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let responses = Arc::new(Mutex::new(VecDeque::from(responses)));

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let responses = responses.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 8192];
                    let mut total = 0;
                    while total < buf.len() {
                        let n = stream.read(&mut buf[total..]).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        total += n;
                        if buf[..total].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }

                    let (status, body) = responses
                        .lock()
                        .await
                        .pop_front()
                        .unwrap_or((500, "{}".to_string()));
                    let reason = match status {
                        200 => "OK",
                        409 => "Conflict",
                        _ => "Error",
                    };
                    let resp = format!(
                        "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(resp.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        StubServer { addr }
    }

    fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

#[tokio::test]
async fn payload_telemetry_first_attempt_succeeds() {
    let data = b"$$ABC,1,2*07\n";
    let doc_id = hex::encode(Sha256::digest(data));

    let stub = StubServer::start(vec![(200, json!({"id": doc_id, "rev": "1-a"}).to_string())]).await;
    let uploader = Uploader::new("M0ABC", stub.url(), "habitat", 20).unwrap();

    let id = uploader
        .payload_telemetry(data, json!({"latitude": 52.0}), -1)
        .await
        .unwrap();
    assert_eq!(id, doc_id);
}

#[tokio::test]
async fn payload_telemetry_merges_after_one_conflict() {
    let data = b"$$ABC,1,2*07\n";
    let doc_id = hex::encode(Sha256::digest(data));
    let data_b64 = BASE64.encode(data);

    let existing_doc = json!({
        "_id": doc_id,
        "_rev": "2-existing",
        "type": "payload_telemetry",
        "data": {"_raw": data_b64},
        "receivers": {
            "G0XYZ": {"time_created": 1, "time_uploaded": 1},
        },
    });

    let stub = StubServer::start(vec![
        (409, json!({"error": "conflict"}).to_string()),
        (200, existing_doc.to_string()),
        (200, json!({"id": doc_id, "rev": "3-merged"}).to_string()),
    ])
    .await;
    let uploader = Uploader::new("M0ABC", stub.url(), "habitat", 20).unwrap();

    let id = uploader
        .payload_telemetry(data, serde_json::Value::Null, -1)
        .await
        .unwrap();
    assert_eq!(id, doc_id);
}

#[tokio::test]
async fn payload_telemetry_reports_collision_on_differing_raw_data() {
    let data = b"$$ABC,1,2*07\n";
    let doc_id = hex::encode(Sha256::digest(data));

    let existing_doc = json!({
        "_id": doc_id,
        "_rev": "2-existing",
        "type": "payload_telemetry",
        "data": {"_raw": "not-the-same-payload"},
        "receivers": {},
    });

    let stub = StubServer::start(vec![
        (409, json!({"error": "conflict"}).to_string()),
        (200, existing_doc.to_string()),
    ])
    .await;
    let uploader = Uploader::new("M0ABC", stub.url(), "habitat", 20).unwrap();

    let err = uploader
        .payload_telemetry(data, serde_json::Value::Null, -1)
        .await
        .unwrap_err();
    assert!(matches!(err, habitat_core::HabitatError::Collision { .. }));
}

#[tokio::test]
async fn flights_returns_rows_from_the_view() {
    let view_response = json!({
        "rows": [
            {"key": null, "value": {"payload": "ABC"}},
            {"key": null, "value": {"payload": "XYZ"}},
        ],
    });
    let stub = StubServer::start(vec![(200, view_response.to_string())]).await;
    let uploader = Uploader::new("M0ABC", stub.url(), "habitat", 20).unwrap();

    let flights = uploader.flights().await.unwrap();
    assert_eq!(flights.len(), 2);
    assert_eq!(flights[0]["payload"], "ABC");
    assert_eq!(flights[1]["payload"], "XYZ");
}

/// Records each lifecycle callback in invocation order, so ordering
/// guarantees (not just occurrence) can be asserted on.
#[derive(Default)]
struct OrderingCallbacks {
    events: std::sync::Mutex<Vec<String>>,
}

impl WorkerCallbacks for OrderingCallbacks {
    fn initialised(&self) {
        self.events.lock().unwrap().push("initialised".to_string());
    }

    fn saved_id(&self, doc_type: &str, id: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("saved_id:{doc_type}:{id}"));
    }

    fn caught_exception_invalid(&self, what: &str) {
        self.events.lock().unwrap().push(format!("invalid:{what}"));
    }

    fn caught_exception_runtime(&self, what: &str) {
        self.events.lock().unwrap().push(format!("runtime:{what}"));
    }
}

#[tokio::test]
async fn shutdown_ordering_stops_later_actions_and_precedes_initialised_before_saved_id() {
    let data_x = b"$$ABC,1,2*07\n";
    let doc_id_x = hex::encode(Sha256::digest(data_x));
    let stub =
        StubServer::start(vec![(200, json!({"id": doc_id_x, "rev": "1-a"}).to_string())]).await;

    let callbacks = Arc::new(OrderingCallbacks::default());
    let mut worker = UploaderWorker::spawn(callbacks.clone());

    worker.settings("M0ABC", stub.url(), "habitat", 20);
    worker.payload_telemetry(data_x.to_vec(), serde_json::Value::Null, -1);
    worker.shutdown().await;

    // Queued after the worker task has already exited on Shutdown; `send`
    // treats the closed channel as a no-op, so this action never runs.
    let data_y = b"$$ABC,3,4*00\n";
    worker.payload_telemetry(data_y.to_vec(), serde_json::Value::Null, -1);

    let events = callbacks.events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            "initialised".to_string(),
            format!("saved_id:payload_telemetry:{doc_id_x}"),
        ]
    );
}
