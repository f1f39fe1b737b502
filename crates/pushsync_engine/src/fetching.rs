//! Message fetching job.
//!
//! One [`MessageFetchingJob`] is one sync cycle:
//!
//! ```text
//! Idle -> Executing -> AwaitingResponse -> Finishing -> Done
//!   \_______________________________________/
//!        (not registered, or cancelled)
//! ```
//!
//! Executing collects pending delivery reports and recent archive ids from
//! the store; AwaitingResponse is the remote call; Finishing writes the
//! delivery status back and, when the server returned messages, hands
//! them to the [`MessageHandler`]. Handling may fetch again, which is
//! bounded by the handling iteration carried by each job.

use crate::clock::{Clock, SystemClock};
use crate::config::FetchingSettings;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, MessagingEvent};
use crate::handler::{DeliveryStorageAdapter, MessageHandler};
use crate::installation::Installation;
use crate::retry::CancelHandle;
use crate::transport::RemoteSyncClient;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pushsync_protocol::{FetchedMessage, SyncMessagesResponse, SyncRequest};
use pushsync_store::{MessageFilter, MessageRecord, MessageStore, SortKey};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a sync cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The server answered; carries the fetched messages.
    Success(SyncMessagesResponse),
    /// The cycle failed.
    Failure(SyncError),
    /// The cycle was cancelled.
    Cancel,
}

impl SyncOutcome {
    /// Returns true for [`SyncOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success(_))
    }

    /// Returns the failure, if any.
    pub fn error(&self) -> Option<&SyncError> {
        match self {
            SyncOutcome::Failure(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the fetched messages; empty unless successful.
    pub fn messages(&self) -> &[FetchedMessage] {
        match self {
            SyncOutcome::Success(response) => &response.messages,
            _ => &[],
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            SyncOutcome::Success(_) => "success",
            SyncOutcome::Failure(_) => "failure",
            SyncOutcome::Cancel => "cancel",
        }
    }
}

impl From<SyncResult<SyncMessagesResponse>> for SyncOutcome {
    fn from(result: SyncResult<SyncMessagesResponse>) -> Self {
        match result {
            Ok(response) => SyncOutcome::Success(response),
            Err(SyncError::Cancelled) => SyncOutcome::Cancel,
            Err(e) => SyncOutcome::Failure(e),
        }
    }
}

/// Lifecycle of a fetching job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    /// Created, not started.
    Idle,
    /// Reading the store.
    Executing,
    /// Waiting for the remote call.
    AwaitingResponse,
    /// Writing back and handling.
    Finishing,
    /// Completion delivered.
    Done,
}

impl FetchState {
    /// Returns true if moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: FetchState) -> bool {
        use FetchState::*;
        matches!(
            (self, next),
            (Idle, Executing)
                | (Idle, Finishing)
                | (Executing, AwaitingResponse)
                | (Executing, Finishing)
                | (AwaitingResponse, Finishing)
                | (Finishing, Done)
        )
    }

    /// Returns true once the job has delivered its outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchState::Done)
    }
}

/// Builds the ids a cycle at `now` reports.
///
/// Every unreported record goes into the delivery list. The archive list
/// holds reported records created after `now - archive_retention`, newest
/// first, at most `fetch_limit` of them. A window reaching past the
/// representable range is clamped to it.
///
/// # Errors
///
/// Returns [`SyncError::Store`] if the store cannot be queried.
pub fn sync_request_for(
    store: &dyn MessageStore,
    settings: &FetchingSettings,
    now: DateTime<Utc>,
) -> SyncResult<SyncRequest> {
    let cutoff = match now.checked_sub_signed(settings.archive_retention) {
        Some(cutoff) => cutoff,
        None if settings.archive_retention > chrono::Duration::zero() => DateTime::<Utc>::MIN_UTC,
        None => DateTime::<Utc>::MAX_UTC,
    };

    let dlr_message_ids = store
        .find(&MessageFilter::NotReported)?
        .into_iter()
        .map(|r| r.message_id().to_string())
        .collect();

    let archive_message_ids = store
        .find_limited(
            &MessageFilter::ReportedSince(cutoff),
            settings.fetch_limit,
            SortKey::CreationDate,
            false,
        )?
        .into_iter()
        .map(|r| r.message_id().to_string())
        .collect();

    Ok(SyncRequest::new(archive_message_ids, dlr_message_ids))
}

/// Everything a fetching job reads and writes.
#[derive(Clone)]
pub struct FetchContext {
    /// Local message records.
    pub store: Arc<dyn MessageStore>,
    /// The sync call.
    pub remote: Arc<dyn RemoteSyncClient>,
    /// Time source for the retention cutoff and report dates.
    pub clock: Arc<dyn Clock>,
    /// Where delivery events are published.
    pub events: EventBus,
    /// Retention, limits and recursion bound.
    pub settings: FetchingSettings,
    /// Read when the job starts, not when it is created.
    pub installation: Arc<Mutex<Installation>>,
    /// Receives fetched messages.
    pub handler: Option<Arc<dyn MessageHandler>>,
    /// Mirrors delivery status elsewhere.
    pub delivery_adapter: Option<Arc<dyn DeliveryStorageAdapter>>,
}

impl FetchContext {
    /// Creates a context with default settings, the system clock and no
    /// collaborators.
    pub fn new(
        store: Arc<dyn MessageStore>,
        remote: Arc<dyn RemoteSyncClient>,
        installation: Arc<Mutex<Installation>>,
    ) -> Self {
        Self {
            store,
            remote,
            clock: Arc::new(SystemClock),
            events: EventBus::new(),
            settings: FetchingSettings::default(),
            installation,
            handler: None,
            delivery_adapter: None,
        }
    }

    /// Sets the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the event bus.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Sets the fetching settings.
    pub fn with_settings(mut self, settings: FetchingSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the message handler.
    pub fn with_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Sets the delivery storage adapter.
    pub fn with_delivery_adapter(mut self, adapter: Arc<dyn DeliveryStorageAdapter>) -> Self {
        self.delivery_adapter = Some(adapter);
        self
    }

    /// Builds the ids to report at `now`; see [`sync_request_for`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the store cannot be queried.
    pub fn build_sync_request(&self, now: DateTime<Utc>) -> SyncResult<SyncRequest> {
        sync_request_for(self.store.as_ref(), &self.settings, now)
    }

    fn mark_reported(&self, ids: &[String], now: DateTime<Utc>) -> SyncResult<Vec<MessageRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let original = self.store.find(&MessageFilter::IdIn(ids.to_vec()))?;
        let mut records = original.clone();
        for record in &mut records {
            record.mark_delivery_reported(now);
        }

        // A failed save must not leave reported flags behind in memory
        if let Err(e) = self
            .store
            .upsert(&records)
            .and_then(|()| self.store.save_sync())
        {
            if let Err(restore) = self.store.upsert(&original) {
                error!(error = %restore, "cannot roll back unsaved delivery reports");
            }
            return Err(e.into());
        }
        Ok(records)
    }
}

impl std::fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchContext")
            .field("settings", &self.settings)
            .field("has_handler", &self.handler.is_some())
            .field("has_delivery_adapter", &self.delivery_adapter.is_some())
            .finish_non_exhaustive()
    }
}

/// Completion of a fetching job.
pub type FetchCompletion = Box<dyn FnOnce(SyncOutcome) + Send>;

/// One sync cycle.
///
/// The completion is invoked exactly once on every path. When fetched
/// messages are handed to the handler, it is invoked only after the handler
/// reports back.
pub struct MessageFetchingJob {
    context: FetchContext,
    handling_iteration: u32,
    cancel: CancelHandle,
    state: FetchState,
    completion: FetchCompletion,
}

impl MessageFetchingJob {
    /// Creates a job at `handling_iteration` (0 for a cycle nobody
    /// triggered from message handling).
    pub fn new(
        context: FetchContext,
        handling_iteration: u32,
        completion: impl FnOnce(SyncOutcome) + Send + 'static,
    ) -> Self {
        Self {
            context,
            handling_iteration,
            cancel: CancelHandle::new(),
            state: FetchState::Idle,
            completion: Box::new(completion),
        }
    }

    /// Shares an existing cancellation flag.
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the cancellation flag.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Returns the current state.
    pub fn state(&self) -> FetchState {
        self.state
    }

    /// Returns the handling iteration.
    pub fn handling_iteration(&self) -> u32 {
        self.handling_iteration
    }

    /// Runs the cycle. The outcome is delivered through the completion.
    pub fn run(mut self) {
        if self.cancel.is_cancelled() {
            debug!(iteration = self.handling_iteration, "fetch cancelled before start");
            self.transition(FetchState::Finishing);
            return self.complete(SyncOutcome::Cancel);
        }

        let internal_id = self.context.installation.lock().internal_id.clone();
        let Some(internal_id) = internal_id else {
            warn!("not registered, skipping message sync");
            self.transition(FetchState::Finishing);
            return self.complete(SyncOutcome::Failure(SyncError::NoRegistration));
        };

        self.transition(FetchState::Executing);
        let now = self.context.clock.now();
        let request = match self.context.build_sync_request(now) {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "cannot collect message ids");
                self.transition(FetchState::Finishing);
                return self.complete(SyncOutcome::Failure(e));
            }
        };

        debug!(
            iteration = self.handling_iteration,
            dlr = request.dlr_message_ids.len(),
            archive = request.archive_message_ids.len(),
            "syncing messages"
        );
        self.transition(FetchState::AwaitingResponse);
        let outcome = SyncOutcome::from(self.context.remote.sync_messages(&internal_id, &request));

        self.transition(FetchState::Finishing);
        match outcome {
            SyncOutcome::Success(response) => {
                self.write_back(request.dlr_message_ids, now, response)
            }
            other => {
                if let Some(e) = other.error() {
                    warn!(error = %e, "message sync failed");
                }
                self.complete(other)
            }
        }
    }

    fn write_back(self, dlr_ids: Vec<String>, now: DateTime<Utc>, response: SyncMessagesResponse) {
        let updated = match self.context.mark_reported(&dlr_ids, now) {
            Ok(updated) => updated,
            Err(e) => {
                error!(error = %e, "cannot persist delivery reports");
                return self.complete(SyncOutcome::Failure(e));
            }
        };

        if !dlr_ids.is_empty() {
            info!(count = dlr_ids.len(), "delivery reports sent");
            self.context.events.publish(MessagingEvent::DeliveryReportSent {
                message_ids: dlr_ids,
            });
        }

        let outcome = SyncOutcome::Success(response);
        match self.context.delivery_adapter.clone() {
            Some(adapter) if !updated.is_empty() => {
                adapter
                    .batch_delivery_status_update(updated, Box::new(move || self.handle(outcome)));
            }
            _ => self.handle(outcome),
        }
    }

    fn handle(self, outcome: SyncOutcome) {
        let handler = self
            .context
            .handler
            .clone()
            .filter(|_| !outcome.messages().is_empty());
        let Some(handler) = handler else {
            return self.complete(outcome);
        };

        if self.handling_iteration >= self.context.settings.iteration_limit {
            debug!(
                iteration = self.handling_iteration,
                limit = self.context.settings.iteration_limit,
                "handling iteration limit reached"
            );
            return self.complete(outcome);
        }

        let messages = outcome.messages().to_vec();
        let next_iteration = self.handling_iteration + 1;
        debug!(count = messages.len(), iteration = next_iteration, "handing messages over");
        handler.handle_fetched_messages(
            messages,
            next_iteration,
            Box::new(move |result| {
                if let Err(e) = result {
                    warn!(error = %e, "message handling failed");
                }
                self.complete(outcome);
            }),
        );
    }

    fn complete(mut self, outcome: SyncOutcome) {
        self.transition(FetchState::Done);
        info!(
            iteration = self.handling_iteration,
            outcome = outcome.kind(),
            messages = outcome.messages().len(),
            "sync cycle finished"
        );
        (self.completion)(outcome);
    }

    fn transition(&mut self, next: FetchState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal fetch transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "fetch state");
        self.state = next;
    }
}
