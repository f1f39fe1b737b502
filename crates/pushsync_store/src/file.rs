//! JSON file-backed message store.

use crate::error::{StoreError, StoreResult};
use crate::record::MessageRecord;
use crate::store::{select, MessageFilter, MessageStore, SortKey};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    messages: Vec<MessageRecord>,
}

/// A message store persisted as a single JSON document.
///
/// Records are held in memory and written out in full on
/// [`MessageStore::save_sync`].
///
/// # Durability
///
/// - `save_sync()` writes a sibling temp file, calls `File::sync_all()`,
///   then renames it over the store file
/// - Changes made after the last `save_sync()` are lost on process exit
///
/// # Example
///
/// ```no_run
/// use chrono::Utc;
/// use pushsync_store::{JsonFileStore, MessageRecord, MessageStore};
/// use std::path::Path;
///
/// let store = JsonFileStore::open(Path::new("messages.json")).unwrap();
/// store.insert(MessageRecord::new("m1", Utc::now())).unwrap();
/// store.save_sync().unwrap();
/// ```
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: RwLock<Vec<MessageRecord>>,
}

impl JsonFileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, has
    /// an unknown format version, or contains a record that violates its
    /// invariants.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let records = if path.exists() {
            Self::load(path)?
        } else {
            Vec::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            records: RwLock::new(records),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> StoreResult<Vec<MessageRecord>> {
        let reader = BufReader::new(File::open(path)?);
        let file: StoreFile = serde_json::from_reader(reader)?;

        if file.version != FORMAT_VERSION {
            return Err(StoreError::Corrupted(format!(
                "unsupported format version {}",
                file.version
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for record in &file.messages {
            record.validate().map_err(StoreError::Corrupted)?;
            if !seen.insert(record.message_id()) {
                return Err(StoreError::DuplicateId(record.message_id().to_string()));
            }
        }

        Ok(file.messages)
    }
}

impl MessageStore for JsonFileStore {
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
        let records = self.records.read();
        let tmp_path = self.path.with_extension("json.tmp");

        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            let doc = StoreFile {
                version: FORMAT_VERSION,
                messages: records.clone(),
            };
            serde_json::to_writer_pretty(&mut writer, &doc)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    #[test]
    fn file_open_missing_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages.json");

        let store = JsonFileStore::open(&path).unwrap();
        assert!(store.is_empty().unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages.json");
        let now = Utc::now();

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.insert(MessageRecord::new("m1", now)).unwrap();
            store.insert(MessageRecord::reported("m2", now, now)).unwrap();
            store.save_sync().unwrap();
        }

        {
            let store = JsonFileStore::open(&path).unwrap();
            assert_eq!(store.len().unwrap(), 2);

            let pending = store.find(&MessageFilter::NotReported).unwrap();
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].message_id(), "m1");
        }
    }

    #[test]
    fn file_unsaved_changes_are_lost() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.insert(MessageRecord::new("m1", Utc::now())).unwrap();
            store.save_sync().unwrap();
            store.insert(MessageRecord::new("m2", Utc::now())).unwrap();
        }

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn file_rejects_invariant_violation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages.json");
        fs::write(
            &path,
            r#"{"version":1,"messages":[{"message_id":"m1","creation_date":"2024-01-01T00:00:00Z","report_sent":true}]}"#,
        )
        .unwrap();

        let result = JsonFileStore::open(&path);
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn file_rejects_unknown_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages.json");
        fs::write(&path, r#"{"version":9,"messages":[]}"#).unwrap();

        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StoreError::Corrupted(_))
        ));
    }

    #[test]
    fn file_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages.json");
        fs::write(&path, b"not json").unwrap();

        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn file_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("messages.json");

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.path(), path);
    }
}
