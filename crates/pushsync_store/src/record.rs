//! Message record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A locally stored mobile-terminated message.
///
/// # Invariants
///
/// - `delivery_reported_date` is set if and only if `report_sent` is true
/// - `seen_sent` implies `seen_date` is set
///
/// Both invariants hold by construction: the flags are private and only
/// change through [`MessageRecord::mark_delivery_reported`] and
/// [`MessageRecord::mark_seen_sent`]. Deserialized records are checked
/// with [`MessageRecord::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    message_id: String,
    creation_date: DateTime<Utc>,
    #[serde(default)]
    report_sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delivery_reported_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seen_date: Option<DateTime<Utc>>,
    #[serde(default)]
    seen_sent: bool,
}

impl MessageRecord {
    /// Creates a record that has not been reported yet.
    pub fn new(message_id: impl Into<String>, creation_date: DateTime<Utc>) -> Self {
        Self {
            message_id: message_id.into(),
            creation_date,
            report_sent: false,
            delivery_reported_date: None,
            seen_date: None,
            seen_sent: false,
        }
    }

    /// Creates a record whose delivery report was already sent at `reported_at`.
    pub fn reported(
        message_id: impl Into<String>,
        creation_date: DateTime<Utc>,
        reported_at: DateTime<Utc>,
    ) -> Self {
        let mut record = Self::new(message_id, creation_date);
        record.mark_delivery_reported(reported_at);
        record
    }

    /// Returns the message id.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Returns the creation date.
    pub fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }

    /// Returns true if a delivery report was sent for this message.
    pub fn report_sent(&self) -> bool {
        self.report_sent
    }

    /// Returns when the delivery report was sent.
    pub fn delivery_reported_date(&self) -> Option<DateTime<Utc>> {
        self.delivery_reported_date
    }

    /// Returns when the user saw the message.
    pub fn seen_date(&self) -> Option<DateTime<Utc>> {
        self.seen_date
    }

    /// Returns true if the seen status reached the server.
    pub fn seen_sent(&self) -> bool {
        self.seen_sent
    }

    /// Marks the delivery report as sent at `at`.
    pub fn mark_delivery_reported(&mut self, at: DateTime<Utc>) {
        self.report_sent = true;
        self.delivery_reported_date = Some(at);
    }

    /// Records that the user saw the message at `at`.
    ///
    /// The first seen date wins; returns false if it was already set.
    pub fn mark_seen(&mut self, at: DateTime<Utc>) -> bool {
        if self.seen_date.is_some() {
            return false;
        }
        self.seen_date = Some(at);
        true
    }

    /// Marks the seen status as delivered to the server.
    ///
    /// No-op for a record that was never seen.
    pub fn mark_seen_sent(&mut self) {
        if self.seen_date.is_some() {
            self.seen_sent = true;
        }
    }

    /// Checks the record invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.report_sent != self.delivery_reported_date.is_some() {
            return Err(format!(
                "message {}: report_sent={} but delivery_reported_date={:?}",
                self.message_id, self.report_sent, self.delivery_reported_date
            ));
        }
        if self.seen_sent && self.seen_date.is_none() {
            return Err(format!(
                "message {}: seen_sent without seen_date",
                self.message_id
            ));
        }
        Ok(())
    }
}
