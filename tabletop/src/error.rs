//! Error taxonomy for the client core.
//!
//! Nothing here is fatal. Validation and permission failures reject a local
//! edit before it is sent; duplicates are dropped; a desync or lost channel
//! ends in a snapshot resync.

use crate::doc::EntityId;

/// Grepable error code and retryable flag for structured error reporting.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// Malformed mutation input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be finite")]
    NonFinite { field: &'static str },
    #[error("{field} must be greater than zero (got {value})")]
    NonPositive { field: &'static str, value: f64 },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

/// Failure to apply a mutation to the state store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MutationError {
    #[error("invalid mutation: {0}")]
    Validation(#[from] ValidationError),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: EntityId },
}

impl ErrorCode for MutationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "E_VALIDATION",
            Self::NotFound { .. } => "E_NOT_FOUND",
        }
    }
}

/// Synchronization protocol failures.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("duplicate message from {sender}: sequence {sequence} <= last seen {last_seen}")]
    DuplicateMessage { sender: String, sequence: u64, last_seen: u64 },
    #[error("desync detected: local revision {local}, remote revision {remote}")]
    DesyncDetected { local: u64, remote: u64 },
    #[error("channel lost")]
    ChannelLost,
    #[error("message for session {got} received in session {expected}")]
    WrongSession { expected: String, got: String },
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: frames::MessageType,
        #[source]
        source: serde_json::Error,
    },
}

impl ErrorCode for SyncError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Mutation(e) => e.error_code(),
            Self::PermissionDenied(_) => "E_PERMISSION_DENIED",
            Self::DuplicateMessage { .. } => "E_DUPLICATE_MESSAGE",
            Self::DesyncDetected { .. } => "E_DESYNC",
            Self::ChannelLost => "E_CHANNEL_LOST",
            Self::WrongSession { .. } => "E_WRONG_SESSION",
            Self::Payload { .. } => "E_PAYLOAD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::DesyncDetected { .. } | Self::ChannelLost)
    }
}

/// Event loop admission failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("task queue full ({capacity} pending)")]
    Full { capacity: usize },
}

impl ErrorCode for QueueError {
    fn error_code(&self) -> &'static str {
        "E_QUEUE_FULL"
    }

    fn retryable(&self) -> bool {
        true
    }
}

/// Saving or loading a snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("snapshot file i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot file malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("saved session cannot be restored: {0}")]
    Restore(#[from] MutationError),
}

impl ErrorCode for PersistError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "E_PERSIST_IO",
            Self::Json(_) => "E_PERSIST_FORMAT",
            Self::Restore(e) => e.error_code(),
        }
    }
}
