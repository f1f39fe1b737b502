//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A request that carries messages was built with none.
    #[error("message list must not be empty")]
    EmptyMessageList,

    /// A body could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
