//! CLI command implementations.

pub mod clear;
pub mod dump;
pub mod pending;

use outbox_engine::OutboxError;
use outbox_storage::{FileStore, StorageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// The command needs `--path`.
    #[error("store path required for {0}")]
    MissingPath(&'static str),

    /// The store directory does not exist.
    #[error("store directory not found: {}", .0.display())]
    NotFound(PathBuf),

    /// `clear` was run on a non-empty queue without `--yes`.
    #[error("refusing to discard {count} pending operation(s) without --yes")]
    NotConfirmed {
        /// Operations that would have been discarded.
        count: usize,
    },

    /// Store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Operation log failure.
    #[error(transparent)]
    Outbox(#[from] OutboxError),

    /// JSON output failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Opens an existing store without creating it.
pub(crate) fn open_store(path: &Path) -> Result<Arc<FileStore>, CliError> {
    if !path.is_dir() {
        return Err(CliError::NotFound(path.to_path_buf()));
    }
    Ok(Arc::new(FileStore::open(path)?))
}
