//! In-memory message store for testing.

use crate::error::{StoreError, StoreResult};
use crate::record::MessageRecord;
use crate::store::{select, MessageFilter, MessageStore, SortKey};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// An in-memory message store.
///
/// This store keeps all records in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral clients that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use pushsync_store::{MemoryMessageStore, MessageRecord, MessageStore};
///
/// let store = MemoryMessageStore::with_records(vec![MessageRecord::new("m1", Utc::now())]);
/// assert_eq!(store.len().unwrap(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    records: RwLock<Vec<MessageRecord>>,
    saves: AtomicU64,
}

impl MemoryMessageStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing records, kept in the given order.
    #[must_use]
    pub fn with_records(records: Vec<MessageRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            saves: AtomicU64::new(0),
        }
    }

    /// Returns a copy of the record with the given id.
    pub fn get(&self, message_id: &str) -> Option<MessageRecord> {
        self.records
            .read()
            .iter()
            .find(|r| r.message_id() == message_id)
            .cloned()
    }

    /// Returns a copy of all records in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<MessageRecord> {
        self.records.read().clone()
    }

    /// Returns how many times `save_sync` was called.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }
}

impl MessageStore for MemoryMessageStore {
    fn find(&self, filter: &MessageFilter) -> StoreResult<Vec<MessageRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    fn find_limited(
        &self,
        filter: &MessageFilter,
        limit: usize,
        sort: SortKey,
        ascending: bool,
    ) -> StoreResult<Vec<MessageRecord>> {
        Ok(select(self.records.read().iter(), filter, limit, sort, ascending))
    }

    fn insert(&self, record: MessageRecord) -> StoreResult<()> {
        let mut records = self.records.write();
        if records.iter().any(|r| r.message_id() == record.message_id()) {
            return Err(StoreError::DuplicateId(record.message_id().to_string()));
        }
        records.push(record);
        Ok(())
    }

    fn upsert(&self, updated: &[MessageRecord]) -> StoreResult<()> {
        let mut records = self.records.write();
        for record in updated {
            match records
                .iter_mut()
                .find(|r| r.message_id() == record.message_id())
            {
                Some(existing) => *existing = record.clone(),
                None => records.push(record.clone()),
            }
        }
        Ok(())
    }

    fn save_sync(&self) -> StoreResult<()> {
        // Nothing to flush
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        self.records.write().clear();
        Ok(())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.records.read().len())
    }
}
