//! Durable store trait definition.

use crate::error::{StorageError, StorageResult};

/// A partitioned key-value store that survives process restarts.
///
/// Stores are **opaque byte stores** grouped into named partitions
/// ("stores" in browser terms). They provide simple put/get/get-all/
/// delete/clear operations and never interpret the bytes they hold.
///
/// # Invariants
///
/// - `put_record` replaces any previous value for the key in one step;
///   a reader sees either the old value or the new one, never a mix
/// - `get_all_records` returns records ordered by key
/// - Deleting a missing key and clearing a missing partition succeed
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait DurableStore: Send + Sync {
    /// Stores `value` under `key` in `partition`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition name is invalid or the write fails.
    fn put_record(&self, partition: &str, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Reads the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read.
    fn get_record(&self, partition: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Reads every record in `partition`, ordered by key.
    ///
    /// A partition that was never written is empty, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition cannot be listed or read.
    fn get_all_records(&self, partition: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;

    /// Deletes the record stored under `key`. Missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete_record(&self, partition: &str, key: &str) -> StorageResult<()>;

    /// Deletes every record in `partition`.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition cannot be cleared.
    fn clear_partition(&self, partition: &str) -> StorageResult<()>;
}

/// Checks that a partition or key name is non-empty and printable.
///
/// Partition names are further restricted to ASCII alphanumerics, `_`,
/// `-` and `.` because file-backed stores map them to directory names.
///
/// # Errors
///
/// Returns [`StorageError::InvalidName`] when the name is rejected.
pub fn validate_name(what: &'static str, name: &str) -> StorageResult<()> {
    let invalid = || StorageError::InvalidName {
        what,
        name: name.to_string(),
    };

    if name.is_empty() || name.chars().any(char::is_control) {
        return Err(invalid());
    }

    if what == "partition" {
        let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.');
        if !name.chars().all(allowed) || name.starts_with('.') {
            return Err(invalid());
        }
    }

    Ok(())
}
