//! Receive command implementation.

use chrono::Utc;
use pushsync_store::{JsonFileStore, MessageFilter, MessageRecord, MessageStore};
use std::path::Path;
use tracing::info;

/// Adds records for `message_ids` not yet in `store`. Returns how many were
/// added.
pub fn receive(
    store: &dyn MessageStore,
    message_ids: &[String],
) -> Result<usize, Box<dyn std::error::Error>> {
    let known = store.find(&MessageFilter::IdIn(message_ids.to_vec()))?;
    let now = Utc::now();

    let mut added = 0;
    for id in message_ids {
        if known.iter().any(|r| r.message_id() == id) {
            continue;
        }
        store.insert(MessageRecord::new(id.clone(), now))?;
        added += 1;
    }
    store.save_sync()?;
    Ok(added)
}

/// Runs the receive command. Creates the store if needed.
pub fn run(path: &Path, message_ids: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let store = JsonFileStore::open(path)?;
    let added = receive(&store, message_ids)?;
    info!(added, skipped = message_ids.len() - added, "messages recorded");
    println!("Recorded {added} new message(s) in {}", path.display());
    Ok(())
}
