//! Dump command implementation.

use super::{open_store, CliError};
use outbox_engine::{read_persisted, MutationRecord};
use serde::Serialize;
use std::path::Path;

/// Queued operation representation for output.
#[derive(Debug, Serialize)]
pub struct OperationInfo {
    /// Position in replay order.
    pub position: usize,
    /// Operation id, also the idempotency key.
    pub id: String,
    /// Mutation kind.
    pub kind: String,
    /// Target resource path.
    pub target: String,
    /// Failed attempts so far.
    pub attempts: u32,
    /// Enqueue time in milliseconds since the Unix epoch.
    pub enqueued_at: u64,
    /// Domain payload.
    pub payload: serde_json::Value,
}

impl OperationInfo {
    fn from_record(position: usize, record: MutationRecord) -> Self {
        Self {
            position,
            id: record.id.to_string(),
            kind: record.kind.to_string(),
            target: record.target,
            attempts: record.attempts,
            enqueued_at: record.enqueued_at,
            payload: record.payload,
        }
    }
}

/// Everything the dump command reports.
#[derive(Debug, Serialize)]
pub struct Listing {
    /// Total queued operations, before the limit.
    pub total: usize,
    /// Listed operations.
    pub operations: Vec<OperationInfo>,
    /// Elements that could not be decoded, as `(index, reason)`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<(usize, String)>,
}

/// Runs the dump command.
pub fn run(path: &Path, partition: &str, limit: Option<usize>) -> Result<Listing, CliError> {
    let store = open_store(path)?;
    let decoded = read_persisted(store.as_ref(), partition)?;
    let total = decoded.records.len();

    let operations = decoded
        .records
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(i, record)| OperationInfo::from_record(i, record))
        .collect();

    Ok(Listing {
        total,
        operations,
        skipped: decoded.skipped,
    })
}

/// Prints a listing as text.
pub fn print_text(listing: &Listing) {
    println!("Pending operations ({} total)", listing.total);
    println!("==================");
    println!();

    for op in &listing.operations {
        println!(
            "[{:04}] {:6} {} id={} attempts={}",
            op.position, op.kind, op.target, op.id, op.attempts
        );
    }

    if listing.operations.len() < listing.total {
        println!("... {} more", listing.total - listing.operations.len());
    }
    for (index, reason) in &listing.skipped {
        println!("skipped element {}: {}", index, reason);
    }
}
