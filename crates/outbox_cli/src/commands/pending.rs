//! Pending command implementation.

use super::{open_store, CliError};
use outbox_engine::read_persisted;
use std::path::Path;
use tracing::warn;

/// Runs the pending command, returning the number of queued operations.
pub fn run(path: &Path, partition: &str) -> Result<usize, CliError> {
    let store = open_store(path)?;
    let decoded = read_persisted(store.as_ref(), partition)?;
    if !decoded.skipped.is_empty() {
        warn!(skipped = decoded.skipped.len(), "log contains malformed records");
    }
    Ok(decoded.records.len())
}
