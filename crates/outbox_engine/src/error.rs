//! Error types for the outbox engine.

use crate::record::OperationId;
use outbox_storage::StorageError;
use thiserror::Error;

/// Result type for outbox operations.
pub type OutboxResult<T> = Result<T, OutboxError>;

/// Errors surfaced by the operation log and the offline repository.
///
/// The reconciliation engine never returns these from its triggers; it
/// resolves them into log lines, events and statistics instead.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// The durable store rejected a read or write.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The record was queued in memory but the log could not be persisted.
    ///
    /// The record stays queued and is written by the next successful persist.
    #[error("operation {id} queued but not persisted: {source}")]
    NotPersisted {
        /// Identifier of the queued record.
        id: OperationId,
        /// The underlying storage failure.
        source: StorageError,
    },

    /// A record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The remote API rejected an operation.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors returned by a [`crate::RemoteApi`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {reason}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Status text or response excerpt.
        reason: String,
    },

    /// The request payload could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(String),

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,
}

impl RemoteError {
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

    /// Returns true if a later attempt could succeed.
    ///
    /// The engine still counts every failure against the retry ceiling;
    /// this classification is for callers and telemetry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport { retryable, .. } => *retryable,
            RemoteError::Timeout => true,
            RemoteError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            RemoteError::Encode(_) => false,
        }
    }
}
