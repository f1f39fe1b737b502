//! Inspect command implementation.

use chrono::{Duration, Utc};
use pushsync_engine::{sync_request_for, FetchingSettings};
use pushsync_protocol::SyncRequest;
use pushsync_store::{JsonFileStore, MessageFilter, MessageStore};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Number of records.
    pub total: usize,
    /// Records whose delivery report is pending.
    pub pending_reports: usize,
    /// Records whose delivery was reported.
    pub reported: usize,
    /// Records seen by the user whose seen status is not sent.
    pub seen_unsent: usize,
    /// What the next sync cycle would send.
    pub next_request: SyncRequest,
}

/// Collects statistics from `store`.
pub fn inspect(
    store: &dyn MessageStore,
    settings: &FetchingSettings,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let total = store.len()?;
    let pending_reports = store.find(&MessageFilter::NotReported)?.len();
    let seen_unsent = store.find(&MessageFilter::SeenNotSent)?.len();
    let next_request = sync_request_for(store, settings, Utc::now())?;

    Ok(InspectResult {
        path: String::new(),
        total,
        pending_reports,
        reported: total - pending_reports,
        seen_unsent,
        next_request,
    })
}

/// Converts a retention window in days, rejecting negative or
/// unrepresentable values.
pub fn retention_window(days: i64) -> Result<Duration, Box<dyn std::error::Error>> {
    if days < 0 {
        return Err(format!("retention must not be negative, got {days} days").into());
    }
    let window = Duration::try_days(days)
        .filter(|window| Utc::now().checked_sub_signed(*window).is_some())
        .ok_or_else(|| format!("retention of {days} days is out of range"))?;
    Ok(window)
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    retention_days: i64,
    fetch_limit: usize,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let retention = retention_window(retention_days)?;
    if !path.exists() {
        return Err(format!("No message store found at {:?}", path).into());
    }

    let store = JsonFileStore::open(path)?;
    let settings = FetchingSettings::default()
        .with_archive_retention(retention)
        .with_fetch_limit(fetch_limit);

    let mut result = inspect(&store, &settings)?;
    result.path = path.display().to_string();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text(&result),
    }

    Ok(())
}

fn print_text(result: &InspectResult) {
    println!("Message Store: {}", result.path);
    println!();
    println!("Records:");
    println!("  Total:            {}", result.total);
    println!("  Pending reports:  {}", result.pending_reports);
    println!("  Reported:         {}", result.reported);
    println!("  Seen, not sent:   {}", result.seen_unsent);
    println!();
    println!("Next sync request:");
    println!(
        "  Delivery reports: {}",
        format_ids(&result.next_request.dlr_message_ids)
    );
    println!(
        "  Archive ids:      {}",
        format_ids(&result.next_request.archive_message_ids)
    );
}

fn format_ids(ids: &[String]) -> String {
    if ids.is_empty() {
        "(none)".to_string()
    } else {
        ids.join(", ")
    }
}
