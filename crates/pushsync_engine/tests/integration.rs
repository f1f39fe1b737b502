//! Integration tests for the messaging client against an in-process server.

use parking_lot::Mutex;
use pushsync_engine::{
    ClientConfig, FetchingSettings, HandlerCompletion, HttpRequest, HttpResponse, Installation,
    LoopbackClient, LoopbackServer, MessageHandler, MessagingClient, MessagingEvent, RetryConfig,
    SyncError, SyncOutcome,
};
use pushsync_protocol::{FetchedMessage, SyncRequest};
use pushsync_store::{JsonFileStore, MemoryMessageStore, MessageRecord, MessageStore};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Default)]
struct ServerState {
    /// Payload batches returned by successive sync calls.
    batches: VecDeque<Vec<String>>,
    /// Returned by every sync call once `batches` is empty.
    repeat: Option<String>,
    /// Statuses answered before any real handling, per path.
    failures: VecDeque<(String, u16)>,
    sync_requests: Vec<SyncRequest>,
    calls: Vec<String>,
}

/// A push server that lives in the test process.
#[derive(Clone, Default)]
struct FakePushServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakePushServer {
    fn queue_batch(&self, ids: &[&str]) {
        self.state
            .lock()
            .batches
            .push_back(ids.iter().map(|s| s.to_string()).collect());
    }

    fn repeat_message(&self, id: &str) {
        self.state.lock().repeat = Some(id.to_string());
    }

    fn fail(&self, path: &str, status: u16) {
        self.state
            .lock()
            .failures
            .push_back((path.to_string(), status));
    }

    fn sync_requests(&self) -> Vec<SyncRequest> {
        self.state.lock().sync_requests.clone()
    }

    fn calls_to(&self, path: &str) -> usize {
        self.state.lock().calls.iter().filter(|p| *p == path).count()
    }

    fn next_payload(state: &mut ServerState) -> Vec<String> {
        state
            .batches
            .pop_front()
            .or_else(|| state.repeat.clone().map(|id| vec![id]))
            .unwrap_or_default()
    }
}

impl LoopbackServer for FakePushServer {
    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let mut state = self.state.lock();
        let path = request.path().to_string();
        state.calls.push(path.clone());

        if request.header("Authorization") != Some("App test-app") {
            return HttpResponse::new(401, "unknown application");
        }

        if state.failures.front().is_some_and(|(p, _)| *p == path) {
            if let Some((_, status)) = state.failures.pop_front() {
                return HttpResponse::new(status, "injected failure");
            }
        }

        match path.as_str() {
            "/mobile/2/registration" => {
                HttpResponse::new(200, r#"{"deviceApplicationInstanceId":"inst-1"}"#)
            }
            "/mobile/3/messages" => {
                let ids: SyncRequest = request
                    .body
                    .as_deref()
                    .and_then(|b| serde_json::from_slice(b).ok())
                    .unwrap_or_default();
                state.sync_requests.push(ids);
                let payloads: Vec<_> = Self::next_payload(&mut state)
                    .into_iter()
                    .map(|id| json!({ "messageId": id, "text": "hello" }))
                    .collect();
                HttpResponse::new(200, json!({ "payloads": payloads }).to_string())
            }
            "/mobile/1/messages/seen" => HttpResponse::new(200, ""),
            _ => HttpResponse::new(404, "not found"),
        }
    }
}

fn config() -> ClientConfig {
    ClientConfig::new("test-app", "https://push.test").with_retry(RetryConfig::immediate())
}

fn start(
    server: &FakePushServer,
    store: Arc<dyn MessageStore>,
    installation: Installation,
) -> MessagingClient {
    MessagingClient::builder(config(), store)
        .installation(installation)
        .start(LoopbackClient::new(server.clone()))
        .unwrap()
}

/// Records handler calls and optionally fetches again from inside them.
#[derive(Default)]
struct RecordingHandler {
    log: Arc<Mutex<Vec<String>>>,
    refetch: Mutex<Option<MessagingClient>>,
}

impl MessageHandler for RecordingHandler {
    fn handle_fetched_messages(
        &self,
        messages: Vec<FetchedMessage>,
        iteration: u32,
        completion: HandlerCompletion,
    ) {
        let ids: Vec<_> = messages.iter().map(|m| m.message_id.as_str()).collect();
        self.log
            .lock()
            .push(format!("handle {} @{}", ids.join(","), iteration));

        let client = self.refetch.lock().clone();
        if let Some(client) = client {
            let outcome = client.fetch_blocking(iteration);
            self.log
                .lock()
                .push(format!("refetch @{iteration} success={}", outcome.is_success()));
        }
        completion(Ok(()));
    }
}

#[test]
fn pending_message_is_reported() {
    let server = FakePushServer::default();
    let store = Arc::new(MemoryMessageStore::with_records(vec![MessageRecord::new(
        "m1",
        chrono::Utc::now(),
    )]));
    let client = start(&server, store.clone(), Installation::registered("inst-1"));
    let mut events = client.subscribe();

    let outcome = client.sync_messages_blocking();

    assert!(outcome.is_success());
    assert!(outcome.messages().is_empty());
    assert_eq!(server.sync_requests()[0].dlr_message_ids, vec!["m1"]);
    assert!(store.get("m1").unwrap().report_sent());
    assert_eq!(
        events.try_recv().unwrap(),
        MessagingEvent::DeliveryReportSent {
            message_ids: vec!["m1".into()]
        }
    );
}

#[test]
fn second_cycle_sends_archive_only() {
    let server = FakePushServer::default();
    let store = Arc::new(MemoryMessageStore::with_records(vec![MessageRecord::new(
        "m1",
        chrono::Utc::now(),
    )]));
    let client = start(&server, store.clone(), Installation::registered("inst-1"));

    assert!(client.sync_messages_blocking().is_success());
    let first = store.get("m1").unwrap();
    assert!(client.sync_messages_blocking().is_success());

    let requests = server.sync_requests();
    assert!(requests[1].dlr_message_ids.is_empty());
    assert_eq!(requests[1].archive_message_ids, vec!["m1"]);
    assert_eq!(store.get("m1").unwrap(), first);
}

#[test]
fn fetched_messages_reach_handler_before_completion() {
    let server = FakePushServer::default();
    server.queue_batch(&["m2"]);
    let client = start(
        &server,
        Arc::new(MemoryMessageStore::new()),
        Installation::registered("inst-1"),
    );
    let handler = Arc::new(RecordingHandler::default());
    client.set_message_handler(Some(handler.clone()));

    let log = handler.log.clone();
    let (tx, rx) = std::sync::mpsc::channel();
    client.sync_messages(move |outcome| {
        log.lock().push("completion".into());
        tx.send(outcome).unwrap();
    });
    let outcome = rx.recv().unwrap();

    assert_eq!(outcome.messages()[0].message_id, "m2");
    assert_eq!(*handler.log.lock(), vec!["handle m2 @1", "completion"]);
    client.stop();
}

#[test]
fn recursive_fetching_stops_at_iteration_limit() {
    let server = FakePushServer::default();
    server.repeat_message("mx");
    let client = start(
        &server,
        Arc::new(MemoryMessageStore::new()),
        Installation::registered("inst-1"),
    );
    let handler = Arc::new(RecordingHandler::default());
    *handler.refetch.lock() = Some(client.clone());
    client.set_message_handler(Some(handler.clone()));

    let outcome = client.sync_messages_blocking();

    assert!(outcome.is_success());
    assert_eq!(
        *handler.log.lock(),
        vec![
            "handle mx @1",
            "handle mx @2",
            "refetch @2 success=true",
            "refetch @1 success=true",
        ]
    );
    assert_eq!(server.calls_to("/mobile/3/messages"), 3);

    // Drops the handler and with it the client clone it holds
    client.stop();
}

#[test]
fn failed_sync_leaves_store_untouched() {
    let server = FakePushServer::default();
    server.fail("/mobile/3/messages", 400);
    let store = Arc::new(MemoryMessageStore::with_records(vec![MessageRecord::new(
        "m1",
        chrono::Utc::now(),
    )]));
    let client = start(&server, store.clone(), Installation::registered("inst-1"));

    let completions = Arc::new(Mutex::new(Vec::new()));
    let sink = completions.clone();
    client.sync_messages(move |outcome| sink.lock().push(outcome));
    // Queue barrier: nothing is seen, so no call is made
    assert!(client.set_seen(Vec::new()).unwrap().is_empty());

    let completions = completions.lock();
    assert_eq!(completions.len(), 1);
    assert!(matches!(
        completions[0],
        SyncOutcome::Failure(SyncError::Server { status: 400, .. })
    ));
    assert!(!store.get("m1").unwrap().report_sent());
    assert_eq!(store.save_count(), 0);
}

#[test]
fn sync_is_not_retried_but_registration_is() {
    let server = FakePushServer::default();
    server.fail("/mobile/3/messages", 503);
    let client = start(
        &server,
        Arc::new(MemoryMessageStore::new()),
        Installation::registered("inst-1"),
    );

    let outcome = client.sync_messages_blocking();
    assert!(matches!(
        outcome,
        SyncOutcome::Failure(SyncError::Server { status: 503, .. })
    ));
    assert_eq!(server.calls_to("/mobile/3/messages"), 1);

    server.fail("/mobile/2/registration", 503);
    server.fail("/mobile/2/registration", 503);
    assert_eq!(client.register_device("token").unwrap(), "inst-1");
    assert_eq!(server.calls_to("/mobile/2/registration"), 3);
}

#[test]
fn registration_client_error_is_final() {
    let server = FakePushServer::default();
    server.fail("/mobile/2/registration", 400);
    let client = start(
        &server,
        Arc::new(MemoryMessageStore::new()),
        Installation::default(),
    );

    let result = client.register_device("token");

    assert!(matches!(result, Err(SyncError::Server { status: 400, .. })));
    assert_eq!(server.calls_to("/mobile/2/registration"), 1);
    assert!(!client.installation().is_registered());
}

#[test]
fn unregistered_client_makes_no_calls() {
    let server = FakePushServer::default();
    let client = start(
        &server,
        Arc::new(MemoryMessageStore::new()),
        Installation::default(),
    );

    assert_eq!(
        client.sync_messages_blocking(),
        SyncOutcome::Failure(SyncError::NoRegistration)
    );
    assert_eq!(server.calls_to("/mobile/3/messages"), 0);
}

#[test]
fn register_then_sync() {
    let server = FakePushServer::default();
    server.queue_batch(&["m5", "m6"]);
    let client = start(
        &server,
        Arc::new(MemoryMessageStore::new()),
        Installation::default(),
    );

    client.register_device("token").unwrap();
    let outcome = client.sync_messages_blocking();

    let ids: Vec<_> = outcome
        .messages()
        .iter()
        .map(|m| m.message_id.as_str())
        .collect();
    assert_eq!(ids, vec!["m5", "m6"]);
}

#[test]
fn file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("messages.json");
    let server = FakePushServer::default();

    {
        let store = Arc::new(JsonFileStore::open(&path).unwrap());
        store
            .insert(MessageRecord::new("m1", chrono::Utc::now()))
            .unwrap();
        let client = start(&server, store, Installation::registered("inst-1"));
        assert!(client.sync_messages_blocking().is_success());
        client.stop();
    }

    let reopened = JsonFileStore::open(&path).unwrap();
    let records = reopened.find(&pushsync_store::MessageFilter::All).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].report_sent());
    assert_eq!(server.sync_requests()[0].dlr_message_ids, vec!["m1"]);
}

#[test]
fn oversized_archive_retention_still_completes() {
    let server = FakePushServer::default();
    let config = config().with_fetching(
        FetchingSettings::default().with_archive_retention(chrono::Duration::days(100_000_000)),
    );
    let client = MessagingClient::builder(config, Arc::new(MemoryMessageStore::new()))
        .installation(Installation::registered("inst-1"))
        .start(LoopbackClient::new(server.clone()))
        .unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    client.sync_messages(move |outcome| tx.send(outcome).unwrap());
    assert!(rx.recv().unwrap().is_success());
    assert!(client.sync_messages_blocking().is_success());
    assert!(client.is_running());
    assert_eq!(server.calls_to("/mobile/3/messages"), 2);
    client.stop();
}
