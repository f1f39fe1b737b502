//! # PushSync Store
//!
//! Message record model and store implementations for PushSync.
//!
//! The sync engine never owns message persistence. It talks to a
//! [`MessageStore`], which keeps [`MessageRecord`]s keyed by message id and
//! answers filtered queries over them.
//!
//! ## Available Stores
//!
//! - [`MemoryMessageStore`] - For testing and ephemeral clients
//! - [`JsonFileStore`] - Persists all records to a single JSON file
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use pushsync_store::{MemoryMessageStore, MessageFilter, MessageRecord, MessageStore};
//!
//! let store = MemoryMessageStore::new();
//! store.insert(MessageRecord::new("m1", Utc::now())).unwrap();
//! let pending = store.find(&MessageFilter::NotReported).unwrap();
//! assert_eq!(pending.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod record;
mod store;

pub use error::{StoreError, StoreResult};
pub use file::JsonFileStore;
pub use memory::MemoryMessageStore;
pub use record::MessageRecord;
pub use store::{MessageFilter, MessageStore, SortKey};
