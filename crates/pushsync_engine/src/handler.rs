//! Downstream collaborators of the sync pipeline.

use crate::error::SyncResult;
use pushsync_protocol::FetchedMessage;
use pushsync_store::MessageRecord;

/// Completion handed to a [`MessageHandler`].
pub type HandlerCompletion = Box<dyn FnOnce(SyncResult<()>) + Send>;

/// Completion handed to a [`DeliveryStorageAdapter`].
pub type AdapterCompletion = Box<dyn FnOnce() + Send>;

/// Handles messages returned by a sync cycle.
///
/// Handling may itself trigger another fetch. `iteration` counts how deep
/// that chain is; pass it on to the client when fetching again so the
/// chain stays bounded.
///
/// Implementations must call `completion` exactly once.
pub trait MessageHandler: Send + Sync {
    /// Handles freshly fetched messages.
    fn handle_fetched_messages(
        &self,
        messages: Vec<FetchedMessage>,
        iteration: u32,
        completion: HandlerCompletion,
    );
}

/// Mirrors delivery status into an application-owned message storage.
///
/// Implementations must call `completion` exactly once.
pub trait DeliveryStorageAdapter: Send + Sync {
    /// Receives records whose delivery report was just marked sent.
    fn batch_delivery_status_update(
        &self,
        records: Vec<MessageRecord>,
        completion: AdapterCompletion,
    );
}
