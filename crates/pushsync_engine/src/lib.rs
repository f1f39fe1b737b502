//! # PushSync Engine
//!
//! Message sync engine for the PushSync client.
//!
//! This crate provides:
//! - Retryable jobs with per-request retry limits
//! - A serial job queue that orders every store mutation
//! - The message fetching state machine (delivery reports, archive ids,
//!   bounded recursive handling)
//! - HTTP execution of request descriptors
//! - The [`MessagingClient`] context tying it all together
//!
//! ## Architecture
//!
//! A sync cycle is one queue turn:
//! 1. Collect unreported and recently reported message ids from the store
//! 2. Report them to the server, receiving pending messages
//! 3. Mark the reported messages in the store
//! 4. Hand fetched messages to the handler, which may fetch again
//!
//! ## Key Invariants
//!
//! - A record is reported at most once per successful cycle
//! - A failed or cancelled cycle never writes to the store
//! - Every cycle delivers exactly one outcome
//! - Recursive fetching stops at the configured iteration limit

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod clock;
mod config;
mod error;
mod events;
mod fetching;
mod handler;
mod http;
mod installation;
mod queue;
mod remote;
mod retry;
mod transport;

pub use client::{ClientBuilder, MessagingClient, SyncStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, FetchingSettings, RetryConfig};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, MessagingEvent};
pub use fetching::{
    sync_request_for, FetchCompletion, FetchContext, FetchState, MessageFetchingJob, SyncOutcome,
};
pub use handler::{AdapterCompletion, DeliveryStorageAdapter, HandlerCompletion, MessageHandler};
pub use http::{
    HttpClient, HttpClientError, HttpRequest, HttpResponse, HttpTransport, LoopbackClient,
    LoopbackServer,
};
pub use installation::Installation;
pub use queue::JobQueue;
pub use remote::RemoteApi;
pub use retry::{
    AttemptCounter, AttemptObserver, CancelHandle, RetryRunner, RetryState, RetryableJob,
};
pub use transport::{MockRemote, RemoteService, RemoteSyncClient};
