//! Messaging client context.
//!
//! A [`MessagingClient`] owns one job queue and everything the sync
//! pipeline needs. Every operation that reads and then writes the store or
//! the installation runs as queue work, so operations never interleave.
//!
//! ## Lifecycle
//!
//! ```text
//! start ──> running ──stop──> stopped
//!              │
//!              └──clean_up_and_stop──> store cleared, installation reset, stopped
//! ```
//!
//! A handler that keeps a clone of the client forms a reference cycle with
//! it; [`MessagingClient::stop`] breaks the cycle by dropping collaborators.

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, MessagingEvent};
use crate::fetching::{FetchCompletion, FetchContext, MessageFetchingJob, SyncOutcome};
use crate::handler::{DeliveryStorageAdapter, MessageHandler};
use crate::http::HttpClient;
use crate::installation::Installation;
use crate::queue::JobQueue;
use crate::remote::RemoteApi;
use crate::retry::CancelHandle;
use crate::transport::{RemoteService, RemoteSyncClient};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use pushsync_protocol::{
    MoMessage, MoMessageRequest, MoMessageResponse, RegistrationRequest, SeenData,
    SeenMessagesRequest, UserDataRequest, UserDataResponse,
};
use pushsync_store::{MessageFilter, MessageRecord, MessageStore};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

/// Statistics about sync cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that ended in success.
    pub cycles_completed: u64,
    /// Cycles that ended in failure.
    pub cycles_failed: u64,
    /// Cycles that were cancelled.
    pub cycles_cancelled: u64,
    /// Messages returned by the server.
    pub messages_fetched: u64,
    /// When the last successful cycle finished.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Last error message.
    pub last_error: Option<String>,
}

struct Shared {
    config: ClientConfig,
    store: Arc<dyn MessageStore>,
    remote: Arc<dyn RemoteService>,
    sync_remote: Arc<dyn RemoteSyncClient>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    installation: Arc<Mutex<Installation>>,
    handler: RwLock<Option<Arc<dyn MessageHandler>>>,
    delivery_adapter: RwLock<Option<Arc<dyn DeliveryStorageAdapter>>>,
    stats: Mutex<SyncStats>,
    cancel: CancelHandle,
}

impl Shared {
    fn fetch_context(&self) -> FetchContext {
        let mut context = FetchContext::new(
            Arc::clone(&self.store),
            Arc::clone(&self.sync_remote),
            Arc::clone(&self.installation),
        )
        .with_clock(Arc::clone(&self.clock))
        .with_events(self.events.clone())
        .with_settings(self.config.fetching.clone());
        context.handler = self.handler.read().clone();
        context.delivery_adapter = self.delivery_adapter.read().clone();
        context
    }

    fn run_fetch(self: &Arc<Self>, iteration: u32, completion: FetchCompletion) {
        let shared = Arc::clone(self);
        MessageFetchingJob::new(self.fetch_context(), iteration, move |outcome| {
            shared.record(&outcome);
            completion(outcome);
        })
        .with_cancel_handle(self.cancel.clone())
        .run();
    }

    fn record(&self, outcome: &SyncOutcome) {
        let mut stats = self.stats.lock();
        match outcome {
            SyncOutcome::Success(response) => {
                stats.cycles_completed += 1;
                stats.messages_fetched += response.messages.len() as u64;
                stats.last_sync_time = Some(self.clock.now());
            }
            SyncOutcome::Failure(e) => {
                stats.cycles_failed += 1;
                stats.last_error = Some(e.to_string());
            }
            SyncOutcome::Cancel => stats.cycles_cancelled += 1,
        }
    }

    fn require_registration(&self) -> SyncResult<String> {
        self.installation
            .lock()
            .internal_id
            .clone()
            .ok_or(SyncError::NoRegistration)
    }

    fn message_received(&self, message_id: String) -> SyncResult<bool> {
        let existing = self
            .store
            .find(&MessageFilter::IdIn(vec![message_id.clone()]))?;
        if !existing.is_empty() {
            debug!(message_id = %message_id, "message already stored");
            return Ok(false);
        }
        self.store
            .insert(MessageRecord::new(message_id, self.clock.now()))?;
        self.store.save_sync()?;
        Ok(true)
    }

    fn register(&self, device_token: String) -> SyncResult<String> {
        let known = self.installation.lock().internal_id.clone();
        let request =
            RegistrationRequest::new(device_token.clone(), known, &self.config.platform_type);
        let response = self.remote.register(&request)?;

        {
            let mut installation = self.installation.lock();
            installation.device_token = Some(device_token);
            installation.internal_id = Some(response.internal_id.clone());
        }
        info!(internal_id = %response.internal_id, "device registered");
        self.events.publish(MessagingEvent::RegistrationUpdated {
            internal_id: response.internal_id.clone(),
        });
        Ok(response.internal_id)
    }

    fn set_seen(&self, message_ids: Vec<String>) -> SyncResult<Vec<String>> {
        let now = self.clock.now();

        let mut stamped = Vec::new();
        for mut record in self.store.find(&MessageFilter::IdIn(message_ids))? {
            if record.mark_seen(now) {
                stamped.push(record);
            }
        }
        if !stamped.is_empty() {
            self.store.upsert(&stamped)?;
            self.store.save_sync()?;
        }

        // Includes entries left over from earlier failed sends
        let mut pending = self.store.find(&MessageFilter::SeenNotSent)?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let seen = pending
            .iter()
            .filter_map(|r| r.seen_date().map(|at| SeenData::new(r.message_id(), at)))
            .collect();
        self.remote
            .send_seen(&SeenMessagesRequest::new(seen, now))?;

        for record in &mut pending {
            record.mark_seen_sent();
        }
        self.store.upsert(&pending)?;
        self.store.save_sync()?;

        let message_ids: Vec<String> = pending
            .iter()
            .map(|r| r.message_id().to_string())
            .collect();
        info!(count = message_ids.len(), "seen status sent");
        self.events.publish(MessagingEvent::SeenReported {
            message_ids: message_ids.clone(),
        });
        Ok(message_ids)
    }

    fn send_mo(&self, messages: Vec<MoMessage>) -> SyncResult<MoMessageResponse> {
        let internal_id = self.require_registration()?;
        let request = MoMessageRequest::new(internal_id, &self.config.platform_type, messages)?;
        let response = self.remote.send_mo(&request)?;

        let message_ids = request
            .messages()
            .iter()
            .map(|m| m.message_id.clone())
            .collect();
        self.events
            .publish(MessagingEvent::MoMessagesSent { message_ids });
        Ok(response)
    }

    fn update_user_data(
        &self,
        external_user_id: Option<String>,
        predefined: Option<Map<String, Value>>,
        custom: Option<Map<String, Value>>,
    ) -> SyncResult<UserDataResponse> {
        let internal_id = self.require_registration()?;
        let mut request = UserDataRequest::new(internal_id, external_user_id);
        request.predefined_user_data = predefined;
        request.custom_user_data = custom;
        self.remote.sync_user_data(&request)
    }

    fn clean_up(&self) -> SyncResult<()> {
        self.store.clear()?;
        self.store.save_sync()?;
        self.installation.lock().reset();
        info!("local messaging state cleared");
        Ok(())
    }
}

/// Builds a [`MessagingClient`].
pub struct ClientBuilder {
    config: ClientConfig,
    store: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
    installation: Installation,
}

impl ClientBuilder {
    /// Sets the clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Restores an installation from an earlier run.
    pub fn installation(mut self, installation: Installation) -> Self {
        self.installation = installation;
        self
    }

    /// Starts a client that talks HTTP through `client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the job queue cannot be started.
    pub fn start<C: HttpClient + 'static>(self, client: C) -> SyncResult<MessagingClient> {
        let api = Arc::new(RemoteApi::new(&self.config, client));
        let cancel = api.cancel_handle();
        self.launch(api.clone(), api, cancel)
    }

    /// Starts a client over any [`RemoteService`].
    ///
    /// # Errors
    ///
    /// Returns an error if the job queue cannot be started.
    pub fn start_with_remote<R: RemoteService + 'static>(
        self,
        remote: Arc<R>,
    ) -> SyncResult<MessagingClient> {
        self.launch(remote.clone(), remote, CancelHandle::new())
    }

    fn launch(
        self,
        remote: Arc<dyn RemoteService>,
        sync_remote: Arc<dyn RemoteSyncClient>,
        cancel: CancelHandle,
    ) -> SyncResult<MessagingClient> {
        let queue = JobQueue::new(format!("pushsync-{}", self.config.application_code))?;
        info!(
            base_url = %self.config.base_url,
            platform = %self.config.platform_type,
            "messaging client started"
        );
        Ok(MessagingClient {
            shared: Arc::new(Shared {
                config: self.config,
                store: self.store,
                remote,
                sync_remote,
                clock: self.clock,
                events: EventBus::new(),
                installation: Arc::new(Mutex::new(self.installation)),
                handler: RwLock::new(None),
                delivery_adapter: RwLock::new(None),
                stats: Mutex::new(SyncStats::default()),
                cancel,
            }),
            queue: Arc::new(queue),
        })
    }
}

/// The messaging client.
///
/// Cloning is cheap; clones share the queue and state.
///
/// Blocking methods wait on the job queue and must not be called from
/// inside an async runtime.
#[derive(Clone)]
pub struct MessagingClient {
    shared: Arc<Shared>,
    queue: Arc<JobQueue>,
}

impl MessagingClient {
    /// Returns a builder for a client over `store`.
    pub fn builder(config: ClientConfig, store: Arc<dyn MessageStore>) -> ClientBuilder {
        ClientBuilder {
            config,
            store,
            clock: Arc::new(SystemClock),
            installation: Installation::default(),
        }
    }

    /// Starts a client with default settings that talks HTTP through
    /// `client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the job queue cannot be started.
    pub fn start<C: HttpClient + 'static>(
        config: ClientConfig,
        store: Arc<dyn MessageStore>,
        client: C,
    ) -> SyncResult<Self> {
        Self::builder(config, store).start(client)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Returns true until the client is stopped.
    pub fn is_running(&self) -> bool {
        !self.queue.is_closed()
    }

    /// Returns a copy of the installation.
    pub fn installation(&self) -> Installation {
        self.shared.installation.lock().clone()
    }

    /// Returns sync statistics.
    pub fn stats(&self) -> SyncStats {
        self.shared.stats.lock().clone()
    }

    /// Subscribes to client events.
    pub fn subscribe(&self) -> broadcast::Receiver<MessagingEvent> {
        self.shared.events.subscribe()
    }

    /// Sets or clears the handler for fetched messages.
    pub fn set_message_handler(&self, handler: Option<Arc<dyn MessageHandler>>) {
        *self.shared.handler.write() = handler;
    }

    /// Sets or clears the delivery storage adapter.
    pub fn set_delivery_adapter(&self, adapter: Option<Arc<dyn DeliveryStorageAdapter>>) {
        *self.shared.delivery_adapter.write() = adapter;
    }

    /// Starts a sync cycle and returns immediately.
    ///
    /// `completion` is called exactly once, also when the client is
    /// already stopped.
    pub fn sync_messages(&self, completion: impl FnOnce(SyncOutcome) + Send + 'static) {
        self.fetch_for_iteration(0, completion);
    }

    /// Starts a sync cycle triggered while handling messages of the
    /// cycle at `iteration - 1`.
    pub fn fetch_for_iteration(
        &self,
        iteration: u32,
        completion: impl FnOnce(SyncOutcome) + Send + 'static,
    ) {
        let slot: Arc<Mutex<Option<FetchCompletion>>> =
            Arc::new(Mutex::new(Some(Box::new(completion))));

        let shared = Arc::clone(&self.shared);
        let work_slot = Arc::clone(&slot);
        let submitted = self.queue.submit_async(move || {
            let completion = work_slot.lock().take();
            if let Some(completion) = completion {
                shared.run_fetch(iteration, completion);
            }
        });

        if let Err(e) = submitted {
            warn!(error = %e, "cannot schedule message sync");
            let completion = slot.lock().take();
            if let Some(completion) = completion {
                completion(SyncOutcome::Failure(e));
            }
        }
    }

    /// Runs a sync cycle and waits for its outcome.
    pub fn sync_messages_blocking(&self) -> SyncOutcome {
        self.fetch_blocking(0)
    }

    /// Runs a sync cycle at `iteration` and waits for its outcome.
    ///
    /// Called from queue work, such as a handler answering synchronously,
    /// the cycle runs inline. A handler that defers its completion must use
    /// [`MessagingClient::fetch_for_iteration`] instead.
    pub fn fetch_blocking(&self, iteration: u32) -> SyncOutcome {
        let (tx, rx) = oneshot::channel();
        let completion = move |outcome: SyncOutcome| {
            let _ = tx.send(outcome);
        };

        if self.queue.is_worker_thread() {
            self.shared.run_fetch(iteration, Box::new(completion));
        } else {
            self.fetch_for_iteration(iteration, completion);
        }

        rx.blocking_recv()
            .unwrap_or(SyncOutcome::Failure(SyncError::QueueClosed))
    }

    /// Stores a newly received message so its delivery is reported by the
    /// next cycle. Returns false if the message was already known.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the client is stopped.
    pub fn message_received(&self, message_id: impl Into<String>) -> SyncResult<bool> {
        let shared = Arc::clone(&self.shared);
        let message_id = message_id.into();
        self.queue
            .submit_sync(move || shared.message_received(message_id))?
    }

    /// Registers the device push token and returns the installation id.
    ///
    /// # Errors
    ///
    /// Returns the remote error after the registration retries are spent.
    pub fn register_device(&self, device_token: impl Into<String>) -> SyncResult<String> {
        let shared = Arc::clone(&self.shared);
        let device_token = device_token.into();
        self.queue.submit_sync(move || shared.register(device_token))?
    }

    /// Marks messages as seen and reports every seen message not reported
    /// yet. Returns the ids that were reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the remote call fails. Seen dates
    /// already stamped stay stamped and are sent with the next call.
    pub fn set_seen(&self, message_ids: Vec<String>) -> SyncResult<Vec<String>> {
        let shared = Arc::clone(&self.shared);
        self.queue.submit_sync(move || shared.set_seen(message_ids))?
    }

    /// Sends mobile-originated messages.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoRegistration`] before registration and
    /// [`SyncError::Protocol`] for an empty list.
    pub fn send_mo_messages(&self, messages: Vec<MoMessage>) -> SyncResult<MoMessageResponse> {
        let shared = Arc::clone(&self.shared);
        self.queue.submit_sync(move || shared.send_mo(messages))?
    }

    /// Sends user attributes.
    ///
    /// A `None` external user id leaves the field out of the request.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoRegistration`] before registration.
    pub fn update_user_data(
        &self,
        external_user_id: Option<String>,
        predefined: Option<Map<String, Value>>,
        custom: Option<Map<String, Value>>,
    ) -> SyncResult<UserDataResponse> {
        let shared = Arc::clone(&self.shared);
        self.queue
            .submit_sync(move || shared.update_user_data(external_user_id, predefined, custom))?
    }

    /// Stops the client.
    ///
    /// Cycles still queued complete with [`SyncOutcome::Cancel`]; collaborators
    /// are dropped.
    pub fn stop(&self) {
        if self.queue.is_closed() {
            return;
        }
        self.shared.cancel.cancel();
        self.queue.shutdown();
        self.set_message_handler(None);
        self.set_delivery_adapter(None);
        info!("messaging client stopped");
    }

    /// Clears the store and the installation, then stops the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be cleared; the client is
    /// stopped either way.
    pub fn clean_up_and_stop(&self) -> SyncResult<()> {
        let shared = Arc::clone(&self.shared);
        let result = self.queue.submit_sync(move || shared.clean_up());
        self.stop();
        result?
    }
}

impl std::fmt::Debug for MessagingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingClient")
            .field("queue", &self.queue)
            .field("installation", &self.installation())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::transport::MockRemote;
    use chrono::TimeZone;
    use pushsync_protocol::{FetchedMessage, SyncMessagesResponse};
    use pushsync_store::MemoryMessageStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn client(registered: bool) -> (MessagingClient, Arc<MemoryMessageStore>, Arc<MockRemote>) {
        let store = Arc::new(MemoryMessageStore::new());
        let remote = Arc::new(MockRemote::new("inst-1"));
        let installation = if registered {
            Installation::registered("inst-1")
        } else {
            Installation::default()
        };
        let client = MessagingClient::builder(
            ClientConfig::new("app", "https://push.example.com"),
            store.clone(),
        )
        .clock(Arc::new(ManualClock::new(now())))
        .installation(installation)
        .start_with_remote(remote.clone())
        .unwrap();
        (client, store, remote)
    }

    #[test]
    fn handler_swap_applies_from_next_cycle() {
        struct Named(&'static str, Arc<Mutex<Vec<&'static str>>>);
        impl MessageHandler for Named {
            fn handle_fetched_messages(
                &self,
                _messages: Vec<FetchedMessage>,
                _iteration: u32,
                completion: crate::handler::HandlerCompletion,
            ) {
                self.1.lock().push(self.0);
                completion(Ok(()));
            }
        }

        let (client, _, remote) = client(true);
        for _ in 0..3 {
            remote.push_sync_result(Ok(SyncMessagesResponse::new(vec![FetchedMessage::new(
                "m1",
            )])));
        }
        let log = Arc::new(Mutex::new(Vec::new()));

        client.set_message_handler(Some(Arc::new(Named("first", log.clone()))));
        assert!(client.sync_messages_blocking().is_success());
        client.set_message_handler(Some(Arc::new(Named("second", log.clone()))));
        assert!(client.sync_messages_blocking().is_success());
        client.set_message_handler(None);
        assert!(client.sync_messages_blocking().is_success());

        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn register_stores_internal_id() {
        let (client, _, _) = client(false);
        let mut events = client.subscribe();

        assert_eq!(client.register_device("token").unwrap(), "inst-1");

        let installation = client.installation();
        assert_eq!(installation.internal_id.as_deref(), Some("inst-1"));
        assert_eq!(installation.device_token.as_deref(), Some("token"));
        assert_eq!(
            events.try_recv().unwrap(),
            MessagingEvent::RegistrationUpdated {
                internal_id: "inst-1".into()
            }
        );
    }

    #[test]
    fn registration_failure_keeps_installation() {
        let (client, _, remote) = client(false);
        remote.fail_other_calls(Some(SyncError::Timeout));

        assert_eq!(client.register_device("token"), Err(SyncError::Timeout));
        assert!(!client.installation().is_registered());
    }

    #[test]
    fn received_message_is_reported_once() {
        let (client, store, remote) = client(true);

        assert!(client.message_received("m1").unwrap());
        assert!(!client.message_received("m1").unwrap());

        assert!(client.sync_messages_blocking().is_success());
        assert!(store.get("m1").unwrap().report_sent());

        assert!(client.sync_messages_blocking().is_success());
        let requests = remote.sync_requests();
        assert_eq!(requests[0].1.dlr_message_ids, vec!["m1"]);
        assert!(requests[1].1.dlr_message_ids.is_empty());
        assert_eq!(requests[1].1.archive_message_ids, vec!["m1"]);
    }

    #[test]
    fn stats_track_outcomes() {
        let (client, _, remote) = client(true);
        remote.push_sync_result(Ok(SyncMessagesResponse::new(vec![FetchedMessage::new(
            "m1",
        )])));
        remote.push_sync_result(Err(SyncError::Timeout));

        client.sync_messages_blocking();
        client.sync_messages_blocking();

        let stats = client.stats();
        assert_eq!(stats.cycles_completed, 1);
        assert_eq!(stats.cycles_failed, 1);
        assert_eq!(stats.messages_fetched, 1);
        assert_eq!(stats.last_sync_time, Some(now()));
        assert_eq!(stats.last_error.as_deref(), Some("operation timed out"));
    }

    #[test]
    fn set_seen_reports_and_marks_sent() {
        let (client, store, remote) = client(true);
        client.message_received("m1").unwrap();
        client.message_received("m2").unwrap();

        let reported = client.set_seen(vec!["m1".into()]).unwrap();

        assert_eq!(reported, vec!["m1"]);
        let record = store.get("m1").unwrap();
        assert_eq!(record.seen_date(), Some(now()));
        assert!(record.seen_sent());
        assert!(store.get("m2").unwrap().seen_date().is_none());
        assert_eq!(remote.seen_requests().len(), 1);
    }

    #[test]
    fn failed_seen_is_resent_later() {
        let (client, store, remote) = client(true);
        client.message_received("m1").unwrap();

        remote.fail_other_calls(Some(SyncError::Timeout));
        assert_eq!(client.set_seen(vec!["m1".into()]), Err(SyncError::Timeout));
        assert!(store.get("m1").unwrap().seen_date().is_some());
        assert!(!store.get("m1").unwrap().seen_sent());

        remote.fail_other_calls(None);
        assert_eq!(client.set_seen(Vec::new()).unwrap(), vec!["m1"]);
        assert!(store.get("m1").unwrap().seen_sent());
    }

    #[test]
    fn mo_and_user_data_require_registration() {
        let (client, _, _) = client(false);

        assert_eq!(
            client.send_mo_messages(vec![MoMessage::new("hi")]),
            Err(SyncError::NoRegistration)
        );
        assert_eq!(
            client.update_user_data(Some("user".into()), None, None),
            Err(SyncError::NoRegistration)
        );
    }

    #[test]
    fn mo_messages_are_sent() {
        let (client, _, remote) = client(true);
        let mut events = client.subscribe();
        let message = MoMessage::new("hello");
        let id = message.message_id.clone();

        let response = client.send_mo_messages(vec![message]).unwrap();

        assert_eq!(response.messages[0].message_id, id);
        assert_eq!(remote.mo_requests().len(), 1);
        assert_eq!(
            events.try_recv().unwrap(),
            MessagingEvent::MoMessagesSent {
                message_ids: vec![id]
            }
        );
    }

    #[test]
    fn empty_mo_list_is_rejected() {
        let (client, _, remote) = client(true);
        assert!(matches!(
            client.send_mo_messages(Vec::new()),
            Err(SyncError::Protocol(_))
        ));
        assert!(remote.mo_requests().is_empty());
    }

    #[test]
    fn user_data_without_external_id() {
        let (client, _, remote) = client(true);
        let mut custom = Map::new();
        custom.insert("tier".into(), Value::from("gold"));

        let response = client.update_user_data(None, None, Some(custom)).unwrap();

        assert!(response.external_user_id.is_none());
        assert_eq!(response.custom_user_data["tier"], "gold");
        let request = &remote.user_data_requests()[0];
        assert_eq!(request.internal_id, "inst-1");
        assert!(request.external_user_id.is_none());
    }

    #[test]
    fn stopped_client_fails_fast() {
        let (client, _, remote) = client(true);
        client.stop();
        assert!(!client.is_running());

        assert_eq!(
            client.sync_messages_blocking(),
            SyncOutcome::Failure(SyncError::QueueClosed)
        );
        assert_eq!(client.register_device("token"), Err(SyncError::QueueClosed));
        assert!(remote.sync_requests().is_empty());

        let outcome = Arc::new(Mutex::new(None));
        let sink = outcome.clone();
        client.sync_messages(move |o| *sink.lock() = Some(o));
        assert_eq!(
            *outcome.lock(),
            Some(SyncOutcome::Failure(SyncError::QueueClosed))
        );
    }

    #[test]
    fn clean_up_clears_state() {
        let (client, store, _) = client(true);
        client.message_received("m1").unwrap();

        client.clean_up_and_stop().unwrap();

        assert!(store.records().is_empty());
        assert!(!client.installation().is_registered());
        assert!(!client.is_running());
    }
}
