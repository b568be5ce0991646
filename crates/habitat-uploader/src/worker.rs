use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use habitat_core::Action;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::callbacks::WorkerCallbacks;
use crate::uploader::Uploader;

/// Runs the action loop: exactly one uploader instance live at a time,
/// actions applied strictly in submission order, one `tokio::task` standing
/// in for a dedicated OS thread.
async fn run(mut rx: UnboundedReceiver<Action>, callbacks: Arc<dyn WorkerCallbacks>) {
    let mut uploader: Option<Uploader> = None;

    while let Some(action) = rx.recv().await {
        info!(action = %action.describe(), "running action");

        match action {
            Action::Settings {
                callsign,
                couch_uri,
                couch_db,
                max_merge_attempts,
            } => match Uploader::new(callsign, couch_uri, &couch_db, max_merge_attempts) {
                Ok(u) => {
                    uploader = Some(u);
                    callbacks.initialised();
                }
                Err(e) => report(&callbacks, e),
            },
            Action::Reset => {
                uploader = None;
                callbacks.reset_done();
            }
            Action::ListenerInfo { data, time_created } => {
                run_doc(&uploader, &callbacks, "listener_info", |u| {
                    u.listener_info(data, time_created)
                })
                .await;
            }
            Action::ListenerTelemetry { data, time_created } => {
                run_doc(&uploader, &callbacks, "listener_telemetry", |u| {
                    u.listener_telemetry(data, time_created)
                })
                .await;
            }
            Action::PayloadTelemetry {
                data,
                metadata,
                time_created,
            } => match &uploader {
                None => callbacks.caught_exception_invalid("no uploader configured"),
                Some(u) => match u.payload_telemetry(&data, metadata, time_created).await {
                    Ok(id) => callbacks.saved_id("payload_telemetry", &id),
                    Err(e) => report(&callbacks, e),
                },
            },
            Action::Flights => match &uploader {
                None => callbacks.caught_exception_invalid("no uploader configured"),
                Some(u) => match u.flights().await {
                    Ok(flights) => callbacks.got_flights(&flights),
                    Err(e) => report(&callbacks, e),
                },
            },
            Action::Shutdown => break,
        }
    }
}

async fn run_doc<'a, F, Fut>(
    uploader: &'a Option<Uploader>,
    callbacks: &Arc<dyn WorkerCallbacks>,
    doc_type: &str,
    f: F,
) where
    F: FnOnce(&'a Uploader) -> Fut,
    Fut: std::future::Future<Output = Result<String, habitat_core::HabitatError>>,
{
    match uploader {
        None => callbacks.caught_exception_invalid("no uploader configured"),
        Some(u) => match f(u).await {
            Ok(id) => callbacks.saved_id(doc_type, &id),
            Err(e) => report(callbacks, e),
        },
    }
}

fn report(callbacks: &Arc<dyn WorkerCallbacks>, error: habitat_core::HabitatError) {
    if error.is_invalid_argument() {
        callbacks.caught_exception_invalid(&error.to_string());
    } else {
        callbacks.caught_exception_runtime(&error.to_string());
    }
}

/// Fire-and-forget handle onto the single background worker task. Cloning
/// shares the same queue; dropping the last handle does not itself shut the
/// worker down (use [`UploaderWorker::shutdown`] explicitly, as fire-and-
/// forget callers rarely stick around to await a join on drop).
pub struct UploaderWorker {
    tx: UnboundedSender<Action>,
    join: Option<JoinHandle<()>>,
    shutdown_requested: AtomicBool,
}

impl UploaderWorker {
    pub fn spawn(callbacks: Arc<dyn WorkerCallbacks>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let join = tokio::spawn(run(rx, callbacks));
        Self {
            tx,
            join: Some(join),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    fn send(&self, action: Action) {
        info!(action = %action.describe(), "queuing action");
        // The worker only disappears after Shutdown; a send error here means
        // the task already exited, which we treat as a no-op rather than a
        // panic since callers are fire-and-forget by design.
        let _ = self.tx.send(action);
    }

    #[instrument(skip(self, couch_uri))]
    pub fn settings(
        &self,
        callsign: impl Into<String>,
        couch_uri: impl Into<String>,
        couch_db: impl Into<String>,
        max_merge_attempts: u32,
    ) {
        self.send(Action::Settings {
            callsign: callsign.into(),
            couch_uri: couch_uri.into(),
            couch_db: couch_db.into(),
            max_merge_attempts,
        });
    }

    pub fn reset(&self) {
        self.send(Action::Reset);
    }

    pub fn payload_telemetry(&self, data: Vec<u8>, metadata: Value, time_created: i64) {
        self.send(Action::PayloadTelemetry {
            data,
            metadata,
            time_created,
        });
    }

    pub fn listener_telemetry(&self, data: Value, time_created: i64) {
        self.send(Action::ListenerTelemetry { data, time_created });
    }

    pub fn listener_info(&self, data: Value, time_created: i64) {
        self.send(Action::ListenerInfo { data, time_created });
    }

    pub fn flights(&self) {
        self.send(Action::Flights);
    }

    /// Idempotent: queues `Shutdown` once, then awaits the worker task
    /// finishing whatever it had already queued ahead of it.
    pub async fn shutdown(&mut self) {
        if !self.shutdown_requested.swap(true, Ordering::SeqCst) {
            self.send(Action::Shutdown);
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for UploaderWorker {
    fn drop(&mut self) {
        // Drop can't await the join; best effort is queuing Shutdown so the
        // task winds down on its own even if nobody called shutdown().
        if !self.shutdown_requested.swap(true, Ordering::SeqCst) {
            self.send(Action::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCallbacks {
        invalid: Mutex<Vec<String>>,
        initialised: Mutex<u32>,
    }

    impl WorkerCallbacks for RecordingCallbacks {
        fn initialised(&self) {
            *self.initialised.lock().unwrap() += 1;
        }

        fn caught_exception_invalid(&self, what: &str) {
            self.invalid.lock().unwrap().push(what.to_string());
        }
    }

    #[tokio::test]
    async fn settings_with_bad_callsign_is_reported_as_invalid_not_initialised() {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let mut worker = UploaderWorker::spawn(callbacks.clone());

        worker.settings("", "http://habhub.org", "habitat", 20);
        worker.shutdown().await;

        assert_eq!(*callbacks.initialised.lock().unwrap(), 0);
        assert_eq!(callbacks.invalid.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn actions_queued_after_shutdown_never_run() {
        let callbacks = Arc::new(RecordingCallbacks::default());
        let mut worker = UploaderWorker::spawn(callbacks.clone());

        worker.settings("M0ABC", "http://habhub.org", "habitat", 20);
        worker.shutdown().await;
        // Anything sent after shutdown was requested lands on a closed
        // channel and is silently dropped by `send`.
        worker.payload_telemetry(b"$$A,1*00\n".to_vec(), Value::Null, -1);

        assert_eq!(*callbacks.initialised.lock().unwrap(), 1);
    }
}
