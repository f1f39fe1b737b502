//! Request payloads and response types.

use crate::keys;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message ids reported to the server in one sync cycle.
///
/// Built fresh per cycle and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Already-reported messages within the retention window, most recent first.
    #[serde(
        rename = "archiveMsgIds",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub archive_message_ids: Vec<String>,
    /// Messages pending their first delivery report.
    #[serde(rename = "dlrMsgIds", default, skip_serializing_if = "Vec::is_empty")]
    pub dlr_message_ids: Vec<String>,
}

impl SyncRequest {
    /// Creates a new sync request.
    pub fn new(archive_message_ids: Vec<String>, dlr_message_ids: Vec<String>) -> Self {
        Self {
            archive_message_ids,
            dlr_message_ids,
        }
    }

    /// Returns true if neither list carries ids.
    pub fn is_empty(&self) -> bool {
        self.archive_message_ids.is_empty() && self.dlr_message_ids.is_empty()
    }
}

/// A mobile-terminated message returned by the sync call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedMessage {
    /// Server-assigned message id.
    pub message_id: String,
    /// Display text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Application-defined payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_payload: Option<Value>,
    /// Silent messages are not shown to the user.
    #[serde(default)]
    pub silent: bool,
}

impl FetchedMessage {
    /// Creates a message with only an id.
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            text: None,
            custom_payload: None,
            silent: false,
        }
    }

    /// Sets the display text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Response of the sync call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncMessagesResponse {
    /// Messages the device has not acknowledged yet, in server order.
    #[serde(rename = "payloads", default)]
    pub messages: Vec<FetchedMessage>,
}

impl SyncMessagesResponse {
    /// Creates a response carrying `messages`.
    pub fn new(messages: Vec<FetchedMessage>) -> Self {
        Self { messages }
    }
}

/// Response of the registration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// Server-assigned installation id.
    #[serde(rename = "deviceApplicationInstanceId")]
    pub internal_id: String,
}

/// One seen acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenData {
    /// The message the user viewed.
    pub message_id: String,
    /// When it was viewed.
    pub seen_date: DateTime<Utc>,
}

impl SeenData {
    /// Creates a seen entry.
    pub fn new(message_id: impl Into<String>, seen_date: DateTime<Utc>) -> Self {
        Self {
            message_id: message_id.into(),
            seen_date,
        }
    }

    /// Whole seconds between the seen date and `now`, never negative.
    pub fn timestamp_delta(&self, now: DateTime<Utc>) -> u64 {
        (now - self.seen_date).num_seconds().max(0) as u64
    }

    pub(crate) fn to_json(&self, now: DateTime<Utc>) -> Value {
        let mut entry = Map::new();
        entry.insert(keys::MESSAGE_ID.into(), Value::from(self.message_id.clone()));
        entry.insert(
            keys::SEEN_TIMESTAMP_DELTA.into(),
            Value::from(self.timestamp_delta(now)),
        );
        Value::Object(entry)
    }
}

/// Response of the seen call; the server returns an empty object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenMessagesResponse {}

/// Response of the user data call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataResponse {
    /// The external user id the server holds.
    #[serde(default)]
    pub external_user_id: Option<String>,
    /// Predefined attributes as stored by the server.
    #[serde(default)]
    pub predefined_user_data: Map<String, Value>,
    /// Custom attributes as stored by the server.
    #[serde(default)]
    pub custom_user_data: Map<String, Value>,
}

/// A mobile-originated message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoMessage {
    /// Client-generated message id.
    pub message_id: String,
    /// Destination address, if not the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Message text.
    pub text: String,
    /// Application-defined payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_payload: Option<Map<String, Value>>,
}

impl MoMessage {
    /// Creates a message with a fresh random id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            destination: None,
            text: text.into(),
            custom_payload: None,
        }
    }

    /// Sets the destination.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

/// Per-message outcome of an MO send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoMessageStatus {
    /// The message id that was sent.
    pub message_id: String,
    /// Server status code; 0 means accepted.
    #[serde(default)]
    pub status_code: i64,
    /// Human-readable status.
    #[serde(default)]
    pub status: String,
}

/// Response of the MO call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoMessageResponse {
    /// One status per sent message.
    #[serde(default)]
    pub messages: Vec<MoMessageStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn sync_request_omits_empty_lists() {
        let request = SyncRequest::new(vec![], vec!["m1".into()]);
        let json = serde_json::to_value(&request).unwrap();

        assert!(json.get(keys::ARCHIVE_MSG_IDS).is_none());
        assert_eq!(json[keys::DLR_MSG_IDS], serde_json::json!(["m1"]));

        let empty = serde_json::to_value(SyncRequest::default()).unwrap();
        assert_eq!(empty, serde_json::json!({}));
    }

    #[test]
    fn sync_response_decodes_payloads() {
        let body = r#"{"payloads":[{"messageId":"m2","text":"hi"},{"messageId":"m3","silent":true}]}"#;
        let response: SyncMessagesResponse = serde_json::from_str(body).unwrap();

        assert_eq!(response.messages.len(), 2);
        assert_eq!(response.messages[0].message_id, "m2");
        assert_eq!(response.messages[0].text.as_deref(), Some("hi"));
        assert!(response.messages[1].silent);
    }

    #[test]
    fn sync_response_without_payloads_is_empty() {
        let response: SyncMessagesResponse = serde_json::from_str("{}").unwrap();
        assert!(response.messages.is_empty());
    }

    #[test]
    fn seen_delta_clamps_future_dates() {
        let now = Utc::now();
        let past = SeenData::new("m1", now - Duration::seconds(90));
        let future = SeenData::new("m2", now + Duration::seconds(30));

        assert_eq!(past.timestamp_delta(now), 90);
        assert_eq!(future.timestamp_delta(now), 0);
    }

    #[test]
    fn mo_messages_get_distinct_ids() {
        let a = MoMessage::new("hello");
        let b = MoMessage::new("hello");
        assert_ne!(a.message_id, b.message_id);
    }

    #[test]
    fn registration_response_requires_internal_id() {
        let ok: RegistrationResponse =
            serde_json::from_str(r#"{"deviceApplicationInstanceId":"abc"}"#).unwrap();
        assert_eq!(ok.internal_id, "abc");

        assert!(serde_json::from_str::<RegistrationResponse>("{}").is_err());
    }
}
