//! Request descriptors for the remote API.
//!
//! A descriptor is an immutable value that says *what* to send: method,
//! path, query parameters, JSON body and how many times the call may be
//! retried. It never holds transport state; turning a descriptor into a
//! network call is the transport's job.

use crate::error::{ProtocolError, ProtocolResult};
use crate::keys;
use crate::messages::{
    MoMessage, MoMessageResponse, RegistrationResponse, SeenData, SeenMessagesResponse,
    SyncMessagesResponse, SyncRequest, UserDataResponse,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Query parameters, ordered by key.
pub type Parameters = BTreeMap<String, String>;

/// HTTP method of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
}

impl HttpMethod {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }
}

/// Endpoint of a remote call, relative to the base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiPath {
    /// Device registration.
    Registration,
    /// Seen status reporting.
    SeenMessages,
    /// Message sync and delivery reports.
    SyncMessages,
    /// User attributes.
    UserData,
    /// Mobile-originated messages.
    MoMessage,
}

impl ApiPath {
    /// Returns the path string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiPath::Registration => "/mobile/2/registration",
            ApiPath::SeenMessages => "/mobile/1/messages/seen",
            ApiPath::SyncMessages => "/mobile/3/messages",
            ApiPath::UserData => "/mobile/2/userdata",
            ApiPath::MoMessage => "/mobile/1/messages/mo",
        }
    }

    /// Looks up the endpoint for a path string.
    pub fn from_path(path: &str) -> Option<Self> {
        [
            ApiPath::Registration,
            ApiPath::SeenMessages,
            ApiPath::SyncMessages,
            ApiPath::UserData,
            ApiPath::MoMessage,
        ]
        .into_iter()
        .find(|p| p.as_str() == path)
    }
}

/// Declarative description of one remote call.
pub trait RequestDescriptor {
    /// The decoded success value.
    type Response: DeserializeOwned;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// HTTP method.
    fn method(&self) -> HttpMethod {
        HttpMethod::Post
    }

    /// Endpoint.
    fn path(&self) -> ApiPath;

    /// Query parameters.
    fn parameters(&self) -> Parameters {
        Parameters::new()
    }

    /// JSON body, if the call has one.
    fn body(&self) -> Option<Value> {
        None
    }

    /// How many times the call may be repeated after the first attempt.
    fn retry_limit(&self) -> u32 {
        0
    }

    /// Whether a response that fails to decode may be retried.
    fn retries_decoding_errors(&self) -> bool {
        false
    }
}

/// Registers the device push token with the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    /// Push token from the platform.
    pub device_token: String,
    /// Installation id from an earlier registration.
    pub internal_id: Option<String>,
    /// Platform identifier.
    pub platform_type: String,
}

impl RegistrationRequest {
    /// Creates a registration request.
    pub fn new(
        device_token: impl Into<String>,
        internal_id: Option<String>,
        platform_type: impl Into<String>,
    ) -> Self {
        Self {
            device_token: device_token.into(),
            internal_id,
            platform_type: platform_type.into(),
        }
    }
}

impl RequestDescriptor for RegistrationRequest {
    type Response = RegistrationResponse;

    fn name(&self) -> &'static str {
        "registration"
    }

    fn path(&self) -> ApiPath {
        ApiPath::Registration
    }

    fn parameters(&self) -> Parameters {
        let mut params = Parameters::new();
        params.insert(keys::REGISTRATION_ID.into(), self.device_token.clone());
        params.insert(keys::PLATFORM_TYPE.into(), self.platform_type.clone());
        if let Some(id) = &self.internal_id {
            params.insert(keys::INTERNAL_REGISTRATION_ID.into(), id.clone());
        }
        params
    }

    fn retry_limit(&self) -> u32 {
        3
    }
}

/// Reports that the user viewed messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenMessagesRequest {
    /// Seen entries.
    pub seen: Vec<SeenData>,
    /// Reference instant for the timestamp deltas.
    pub sent_at: DateTime<Utc>,
}

impl SeenMessagesRequest {
    /// Creates a seen request whose deltas are measured against `sent_at`.
    pub fn new(seen: Vec<SeenData>, sent_at: DateTime<Utc>) -> Self {
        Self { seen, sent_at }
    }
}

impl RequestDescriptor for SeenMessagesRequest {
    type Response = SeenMessagesResponse;

    fn name(&self) -> &'static str {
        "seen_messages"
    }

    fn path(&self) -> ApiPath {
        ApiPath::SeenMessages
    }

    fn body(&self) -> Option<Value> {
        let entries = self.seen.iter().map(|s| s.to_json(self.sent_at)).collect();
        let mut body = Map::new();
        body.insert(keys::SEEN_MESSAGES.into(), Value::Array(entries));
        Some(Value::Object(body))
    }
}

/// Fetches pending messages and reports delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMessagesRequest {
    /// Installation id.
    pub internal_id: String,
    /// Platform identifier.
    pub platform_type: String,
    /// Ids to report.
    pub ids: SyncRequest,
}

impl SyncMessagesRequest {
    /// Creates a sync request.
    pub fn new(
        internal_id: impl Into<String>,
        platform_type: impl Into<String>,
        ids: SyncRequest,
    ) -> Self {
        Self {
            internal_id: internal_id.into(),
            platform_type: platform_type.into(),
            ids,
        }
    }
}

impl RequestDescriptor for SyncMessagesRequest {
    type Response = SyncMessagesResponse;

    fn name(&self) -> &'static str {
        "sync_messages"
    }

    fn path(&self) -> ApiPath {
        ApiPath::SyncMessages
    }

    fn parameters(&self) -> Parameters {
        let mut params = Parameters::new();
        params.insert(keys::INTERNAL_REGISTRATION_ID.into(), self.internal_id.clone());
        params.insert(keys::PLATFORM_TYPE.into(), self.platform_type.clone());
        params
    }

    fn body(&self) -> Option<Value> {
        serde_json::to_value(&self.ids).ok()
    }
}

/// Sends user attributes.
///
/// A `None` external user id omits the field entirely; it does not ask the
/// server to clear a previously sent value.
#[derive(Debug, Clone, PartialEq)]
pub struct UserDataRequest {
    /// Installation id.
    pub internal_id: String,
    /// Application-level user id.
    pub external_user_id: Option<String>,
    /// Predefined attributes.
    pub predefined_user_data: Option<Map<String, Value>>,
    /// Custom attributes.
    pub custom_user_data: Option<Map<String, Value>>,
}

impl UserDataRequest {
    /// Creates a user data request with no attributes.
    pub fn new(internal_id: impl Into<String>, external_user_id: Option<String>) -> Self {
        Self {
            internal_id: internal_id.into(),
            external_user_id,
            predefined_user_data: None,
            custom_user_data: None,
        }
    }

    /// Sets the predefined attributes.
    pub fn with_predefined(mut self, data: Map<String, Value>) -> Self {
        self.predefined_user_data = Some(data);
        self
    }

    /// Sets the custom attributes.
    pub fn with_custom(mut self, data: Map<String, Value>) -> Self {
        self.custom_user_data = Some(data);
        self
    }
}

impl RequestDescriptor for UserDataRequest {
    type Response = UserDataResponse;

    fn name(&self) -> &'static str {
        "user_data"
    }

    fn path(&self) -> ApiPath {
        ApiPath::UserData
    }

    fn parameters(&self) -> Parameters {
        let mut params = Parameters::new();
        params.insert(keys::INTERNAL_REGISTRATION_ID.into(), self.internal_id.clone());
        if let Some(external) = &self.external_user_id {
            params.insert(keys::EXTERNAL_USER_ID.into(), external.clone());
        }
        params
    }

    fn body(&self) -> Option<Value> {
        let mut body = Map::new();
        body.insert(
            keys::PREDEFINED_USER_DATA.into(),
            Value::Object(self.predefined_user_data.clone().unwrap_or_default()),
        );
        body.insert(
            keys::CUSTOM_USER_DATA.into(),
            Value::Object(self.custom_user_data.clone().unwrap_or_default()),
        );
        Some(Value::Object(body))
    }
}

/// Sends mobile-originated messages.
#[derive(Debug, Clone, PartialEq)]
pub struct MoMessageRequest {
    internal_id: String,
    platform_type: String,
    messages: Vec<MoMessage>,
}

impl MoMessageRequest {
    /// Creates an MO request.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::EmptyMessageList`] if `messages` is empty.
    pub fn new(
        internal_id: impl Into<String>,
        platform_type: impl Into<String>,
        messages: Vec<MoMessage>,
    ) -> ProtocolResult<Self> {
        if messages.is_empty() {
            return Err(ProtocolError::EmptyMessageList);
        }
        Ok(Self {
            internal_id: internal_id.into(),
            platform_type: platform_type.into(),
            messages,
        })
    }

    /// Returns the messages to send.
    pub fn messages(&self) -> &[MoMessage] {
        &self.messages
    }
}

impl RequestDescriptor for MoMessageRequest {
    type Response = MoMessageResponse;

    fn name(&self) -> &'static str {
        "mo_messages"
    }

    fn path(&self) -> ApiPath {
        ApiPath::MoMessage
    }

    fn parameters(&self) -> Parameters {
        let mut params = Parameters::new();
        params.insert(keys::PLATFORM_TYPE.into(), self.platform_type.clone());
        params
    }

    fn body(&self) -> Option<Value> {
        let mut body = Map::new();
        body.insert(keys::MO_FROM.into(), Value::from(self.internal_id.clone()));
        body.insert(
            keys::MO_MESSAGES.into(),
            serde_json::to_value(&self.messages).unwrap_or(Value::Array(Vec::new())),
        );
        Some(Value::Object(body))
    }
}
