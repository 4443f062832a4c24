//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored record could not be read back intact.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// A partition name or record key cannot be stored.
    #[error("invalid {what} name: {name:?}")]
    InvalidName {
        /// Either "partition" or "key".
        what: &'static str,
        /// The rejected name.
        name: String,
    },

    /// The store is unavailable.
    #[error("store is unavailable: {0}")]
    Unavailable(String),
}
