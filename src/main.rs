mod connector;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use habitat_extractor::{PayloadConfiguration, PushFlags, UkhasExtractor};
use habitat_uploader::UploaderWorker;
use serde_json::Value;

use connector::{Connector, TracingCallbacks};

#[derive(Parser)]
#[command(name = "habitat", about = "UKHAS habitat telemetry uploader", version)]
struct Cli {
    /// Station callsign reported with every upload.
    #[arg(short, long)]
    callsign: String,

    /// Document-store base URL.
    #[arg(long, default_value = "http://habhub.org")]
    couch_uri: String,

    /// Document-store database name.
    #[arg(long, default_value = "habitat")]
    couch_db: String,

    /// Conflict-merge retry budget for payload_telemetry uploads.
    #[arg(long, default_value_t = 20)]
    max_merge_attempts: u32,

    /// Demodulated byte stream to read: a path, or "-" for stdin.
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Path to a payload configuration document (sentence descriptor(s) and
    /// expected callsign) used to validate and cook extracted sentences.
    #[arg(long)]
    payload_config: Option<PathBuf>,

    /// Path to a JSON object of receiver metadata (position, radio, ...)
    /// attached to every payload_telemetry upload.
    #[arg(long)]
    receiver_metadata: Option<PathBuf>,

    /// Substitute '#' for '*' on links that can't carry an asterisk.
    #[arg(long)]
    baudot_hack: bool,
}

fn read_json_file(path: &PathBuf) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn open_input(path: &str) -> anyhow::Result<Box<dyn Read>> {
    if path == "-" {
        Ok(Box::new(std::io::stdin()))
    } else {
        Ok(Box::new(std::fs::File::open(path)?))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let receiver_metadata = match &cli.receiver_metadata {
        Some(path) => read_json_file(path)?,
        None => Value::Null,
    };

    let worker = Arc::new(UploaderWorker::spawn(Arc::new(TracingCallbacks)));
    worker.settings(
        cli.callsign.clone(),
        cli.couch_uri.clone(),
        cli.couch_db.clone(),
        cli.max_merge_attempts,
    );

    let connector = Connector::new(worker.clone(), receiver_metadata);
    connector.add(Box::new(UkhasExtractor::new()));

    if let Some(path) = &cli.payload_config {
        let raw = read_json_file(path)?;
        connector.set_payload_config(Some(PayloadConfiguration::from_value(raw)));
    }

    let flags = if cli.baudot_hack {
        PushFlags::BAUDOT_HACK
    } else {
        PushFlags::NONE
    };

    let mut input = open_input(&cli.input)?;
    let mut buf = [0u8; 4096];
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for &byte in &buf[..n] {
            connector.push(byte, flags);
        }
    }

    // Drop the connector first: its raw_sentence callback holds its own
    // clone of `worker`, and `try_unwrap` needs to be the sole owner.
    drop(connector);
    let mut worker = Arc::try_unwrap(worker)
        .unwrap_or_else(|_| panic!("uploader worker still has outstanding references"));
    worker.shutdown().await;

    Ok(())
}
