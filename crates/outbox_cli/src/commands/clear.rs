//! Clear command implementation.

use super::{open_store, CliError};
use outbox_engine::OperationLog;
use std::path::Path;
use tracing::info;

/// Runs the clear command, returning how many operations were discarded.
///
/// A non-empty queue is only cleared when `confirmed` is set.
pub fn run(path: &Path, partition: &str, confirmed: bool) -> Result<usize, CliError> {
    let store = open_store(path)?;
    let log = OperationLog::open(store, partition);
    let count = log.size();

    if count > 0 && !confirmed {
        return Err(CliError::NotConfirmed { count });
    }

    log.clear()?;
    info!(partition, discarded = count, "operation log cleared");
    Ok(count)
}
