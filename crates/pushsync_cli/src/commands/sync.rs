//! Sync command implementation.
//!
//! Runs one real sync cycle against an in-process server that answers the
//! sync endpoint with a fixed body. Useful for checking what a store would
//! report and how it looks afterwards.

use pushsync_engine::{
    ClientConfig, HttpRequest, HttpResponse, Installation, LoopbackClient, LoopbackServer,
    MessagingClient, RetryConfig, SyncOutcome,
};
use pushsync_protocol::{ApiPath, SyncMessagesResponse, SyncRequest};
use pushsync_store::JsonFileStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

const CLI_APPLICATION_CODE: &str = "pushsync-cli";
const CLI_BASE_URL: &str = "loopback://pushsync";

/// Answers sync calls with a fixed body.
pub struct CannedServer {
    body: String,
}

impl CannedServer {
    /// Creates a server answering with `body`.
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

impl LoopbackServer for CannedServer {
    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        match ApiPath::from_path(request.path()) {
            Some(ApiPath::SyncMessages) => {
                let ids: SyncRequest = request
                    .body
                    .as_deref()
                    .and_then(|b| serde_json::from_slice(b).ok())
                    .unwrap_or_default();
                debug!(
                    dlr = ?ids.dlr_message_ids,
                    archive = ?ids.archive_message_ids,
                    "sync request received"
                );
                HttpResponse::new(200, self.body.clone())
            }
            _ => {
                warn!(path = request.path(), "unexpected request");
                HttpResponse::new(404, "not found")
            }
        }
    }
}

/// Runs one cycle for `internal_id` over the store at `path`.
pub fn sync_store(
    path: &Path,
    internal_id: &str,
    response_body: String,
) -> Result<SyncMessagesResponse, Box<dyn std::error::Error>> {
    // Fail early on a body the engine would reject after reporting
    serde_json::from_str::<SyncMessagesResponse>(&response_body)?;

    let store = Arc::new(JsonFileStore::open(path)?);
    let config = ClientConfig::new(CLI_APPLICATION_CODE, CLI_BASE_URL)
        .with_retry(RetryConfig::immediate());
    let client = MessagingClient::builder(config, store)
        .installation(Installation::registered(internal_id))
        .start(LoopbackClient::new(CannedServer::new(response_body)))?;

    let outcome = client.sync_messages_blocking();
    client.stop();

    match outcome {
        SyncOutcome::Success(response) => Ok(response),
        SyncOutcome::Failure(e) => Err(e.into()),
        SyncOutcome::Cancel => Err("sync cancelled".into()),
    }
}

/// Runs the sync command.
pub fn run(
    path: &Path,
    internal_id: &str,
    response: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let body = match response {
        Some(file) => std::fs::read_to_string(file)?,
        None => "{}".to_string(),
    };

    let response = sync_store(path, internal_id, body)?;

    println!("Sync complete: {} message(s) fetched", response.messages.len());
    for message in &response.messages {
        println!(
            "  {} {}",
            message.message_id,
            message.text.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
