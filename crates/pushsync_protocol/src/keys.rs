//! Wire keys and fixed values of the remote API.

/// Device push token.
pub const REGISTRATION_ID: &str = "registrationId";
/// Platform identifier.
pub const PLATFORM_TYPE: &str = "platformType";
/// Server-assigned installation id.
pub const INTERNAL_REGISTRATION_ID: &str = "deviceApplicationInstanceId";
/// Already-reported message ids.
pub const ARCHIVE_MSG_IDS: &str = "archiveMsgIds";
/// Message ids awaiting a delivery report.
pub const DLR_MSG_IDS: &str = "dlrMsgIds";
/// Seen message entries.
pub const SEEN_MESSAGES: &str = "messages";
/// Message id inside a seen entry.
pub const MESSAGE_ID: &str = "messageId";
/// Seconds elapsed since the message was seen.
pub const SEEN_TIMESTAMP_DELTA: &str = "timestampDelta";
/// Application-level user id.
pub const EXTERNAL_USER_ID: &str = "externalUserId";
/// Predefined user attributes.
pub const PREDEFINED_USER_DATA: &str = "predefinedUserData";
/// Free-form user attributes.
pub const CUSTOM_USER_DATA: &str = "customUserData";
/// Sender of mobile-originated messages.
pub const MO_FROM: &str = "from";
/// Mobile-originated message list.
pub const MO_MESSAGES: &str = "messages";

/// Default platform value.
pub const DEFAULT_PLATFORM_TYPE: &str = "APNS";
