//! Error types and the integer status surface.

use thiserror::Error;

/// Integer status codes, as seen by callers that work in status words
/// (and by callbacks reading `LinkHandle::status()`).
pub mod status {
    /// Operation succeeded.
    pub const OK: i64 = 0;
    /// Generic failure: not attached, not connected, bad arguments.
    pub const FAILURE: i64 = -1;
    /// An acknowledged write is already outstanding on this link.
    pub const NOTIFY_IN_PROGRESS: i64 = 1;
    /// The command queue is full; the caller must retry.
    pub const QUEUE_FULL: i64 = 2;
    /// A dispatch failed synchronously; the callback was self-invoked.
    pub const FATAL_ERROR: i64 = 3;
    /// Clear gave up waiting for queued actions on the link.
    pub const ABANDONED: i64 = 4;
}

/// Caller-visible link errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The handle has no private state (never attached, or cleared).
    #[error("link is not attached")]
    NotAttached,

    /// A blank data-point name was supplied.
    #[error("link name is empty")]
    EmptyName,

    /// The link is not connected, or its metadata has not arrived yet.
    #[error("link is not connected")]
    NotConnected,

    /// The operation needs the other link direction.
    #[error("operation not valid on {0} link")]
    WrongDirection(&'static str),

    /// Caller buffer element type does not match the link's data type.
    #[error("element type does not match link type {0}")]
    TypeMismatch(&'static str),

    #[error("notify already in progress")]
    NotifyInProgress,

    #[error("command queue full")]
    QueueFull,

    /// A `local_only` link named a point this process does not serve.
    #[error("'{0}' is not a local point")]
    NotLocal(String),

    /// The engine has been shut down.
    #[error("engine is shutting down")]
    ShuttingDown,

    #[error("fatal dispatch error: {0}")]
    Fatal(String),
}

impl LinkError {
    /// Map onto the integer status surface.
    pub fn code(&self) -> i64 {
        match self {
            LinkError::NotifyInProgress => status::NOTIFY_IN_PROGRESS,
            LinkError::QueueFull => status::QUEUE_FULL,
            LinkError::Fatal(_) => status::FATAL_ERROR,
            _ => status::FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Errors reported by a `RemoteAccess` implementation, either
/// synchronously or through a completion handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("channel disconnected")]
    Disconnected,

    #[error("unknown channel {0}")]
    UnknownChannel(u64),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Io(String),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(LinkError::NotifyInProgress.to_string(), "notify already in progress");
        assert_eq!(
            LinkError::WrongDirection("input").to_string(),
            "operation not valid on input link"
        );
        assert_eq!(ServiceError::UnknownChannel(7).to_string(), "unknown channel 7");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(LinkError::NotConnected.code(), status::FAILURE);
        assert_eq!(LinkError::NotAttached.code(), -1);
        assert_eq!(LinkError::QueueFull.code(), status::QUEUE_FULL);
        assert_eq!(LinkError::Fatal("x".into()).code(), status::FATAL_ERROR);
        assert_eq!(LinkError::NotifyInProgress.code(), status::NOTIFY_IN_PROGRESS);
    }
}
