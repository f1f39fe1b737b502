//! Error types for the sync engine.

use pushsync_protocol::ProtocolError;
use pushsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The client has no internal registration id yet.
    #[error("client is not registered")]
    NoRegistration,

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Server answered with a non-success status.
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Response did not match the expected shape.
    #[error("cannot decode response: {0}")]
    Decoding(String),

    /// A request could not be built or encoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local message store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Caller-initiated cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// The job queue has been shut down.
    #[error("job queue is closed")]
    QueueClosed,

    /// A job panicked on the queue worker.
    #[error("job panicked: {0}")]
    JobPanicked(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::Server { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::Store(err.to_string())
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::Server {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(SyncError::Server {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!SyncError::Server {
            status: 400,
            message: "bad request".into()
        }
        .is_retryable());
    }

    #[test]
    fn terminal_errors() {
        assert!(!SyncError::NoRegistration.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::Decoding("eof".into()).is_retryable());
        assert!(!SyncError::Store("disk full".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::NoRegistration;
        assert_eq!(err.to_string(), "client is not registered");

        let err = SyncError::Server {
            status: 502,
            message: "bad gateway".into(),
        };
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn store_error_converts() {
        let err: SyncError = StoreError::Corrupted("bad".into()).into();
        assert!(matches!(err, SyncError::Store(msg) if msg.contains("bad")));
    }
}
