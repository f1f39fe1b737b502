//! Message store trait definition.

use crate::error::StoreResult;
use crate::record::MessageRecord;
use chrono::{DateTime, Utc};

/// A predicate over message records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    /// Every record.
    All,
    /// Records whose delivery report has not been sent.
    NotReported,
    /// Reported records created strictly after the given instant.
    ReportedSince(DateTime<Utc>),
    /// Records whose id is in the list.
    IdIn(Vec<String>),
    /// Records seen by the user whose seen status was not sent yet.
    SeenNotSent,
}

impl MessageFilter {
    /// Returns true if `record` satisfies the filter.
    pub fn matches(&self, record: &MessageRecord) -> bool {
        match self {
            MessageFilter::All => true,
            MessageFilter::NotReported => !record.report_sent(),
            MessageFilter::ReportedSince(cutoff) => {
                record.report_sent() && record.creation_date() > *cutoff
            }
            MessageFilter::IdIn(ids) => ids.iter().any(|id| id == record.message_id()),
            MessageFilter::SeenNotSent => record.seen_date().is_some() && !record.seen_sent(),
        }
    }
}

/// Sort key for limited queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Order by `creation_date`.
    CreationDate,
}

/// A persistent store of message records.
///
/// The store is keyed by message id. Queries return owned copies; changes
/// become visible through [`MessageStore::upsert`] and durable after
/// [`MessageStore::save_sync`].
///
/// # Invariants
///
/// - Query results preserve insertion order unless a sort is requested
/// - Sorting is stable, so ties keep insertion order
/// - `save_sync` returns only after all upserted records are durable
///
/// # Implementors
///
/// - [`super::MemoryMessageStore`] - For testing
/// - [`super::JsonFileStore`] - For persistent storage
pub trait MessageStore: Send + Sync {
    /// Returns every record matching `filter`, in insertion order.
    fn find(&self, filter: &MessageFilter) -> StoreResult<Vec<MessageRecord>>;

    /// Returns at most `limit` records matching `filter`, sorted by `sort`.
    fn find_limited(
        &self,
        filter: &MessageFilter,
        limit: usize,
        sort: SortKey,
        ascending: bool,
    ) -> StoreResult<Vec<MessageRecord>>;

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::DuplicateId`] if the id is taken.
    fn insert(&self, record: MessageRecord) -> StoreResult<()>;

    /// Replaces existing records by id; unknown ids are inserted.
    fn upsert(&self, records: &[MessageRecord]) -> StoreResult<()>;

    /// Persists all pending changes before returning.
    fn save_sync(&self) -> StoreResult<()>;

    /// Removes every record.
    fn clear(&self) -> StoreResult<()>;

    /// Returns the number of records.
    fn len(&self) -> StoreResult<usize>;

    /// Returns true if the store holds no records.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Filters, sorts and truncates records held in insertion order.
pub(crate) fn select<'a>(
    records: impl Iterator<Item = &'a MessageRecord>,
    filter: &MessageFilter,
    limit: usize,
    sort: SortKey,
    ascending: bool,
) -> Vec<MessageRecord> {
    let mut matched: Vec<MessageRecord> = records.filter(|r| filter.matches(r)).cloned().collect();
    match sort {
        SortKey::CreationDate => {
            if ascending {
                matched.sort_by(|a, b| a.creation_date().cmp(&b.creation_date()));
            } else {
                matched.sort_by(|a, b| b.creation_date().cmp(&a.creation_date()));
            }
        }
    }
    matched.truncate(limit);
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn filter_not_reported() {
        let now = Utc::now();
        let pending = MessageRecord::new("m1", now);
        let reported = MessageRecord::reported("m2", now, now);

        assert!(MessageFilter::NotReported.matches(&pending));
        assert!(!MessageFilter::NotReported.matches(&reported));
    }

    #[test]
    fn filter_reported_since_is_strict() {
        let now = Utc::now();
        let at_cutoff = MessageRecord::reported("m1", now, now);
        let after = MessageRecord::reported("m2", now + Duration::seconds(1), now);
        let unreported = MessageRecord::new("m3", now + Duration::seconds(1));

        let filter = MessageFilter::ReportedSince(now);
        assert!(!filter.matches(&at_cutoff));
        assert!(filter.matches(&after));
        assert!(!filter.matches(&unreported));
    }

    #[test]
    fn select_descending_keeps_tie_order() {
        let now = Utc::now();
        let records = vec![
            MessageRecord::new("a", now),
            MessageRecord::new("b", now + Duration::seconds(5)),
            MessageRecord::new("c", now),
        ];

        let selected = select(
            records.iter(),
            &MessageFilter::All,
            10,
            SortKey::CreationDate,
            false,
        );
        let ids: Vec<_> = selected.iter().map(|r| r.message_id()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn select_truncates_to_limit() {
        let now = Utc::now();
        let records: Vec<_> = (0..5)
            .map(|i| MessageRecord::new(format!("m{i}"), now + Duration::seconds(i)))
            .collect();

        let selected = select(records.iter(), &MessageFilter::All, 2, SortKey::CreationDate, true);
        let ids: Vec<_> = selected.iter().map(|r| r.message_id()).collect();
        assert_eq!(ids, vec!["m0", "m1"]);
    }
}
