//! In-memory store for testing.

use crate::error::StorageResult;
use crate::store::{validate_name, DurableStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;

type Partition = BTreeMap<String, Vec<u8>>;

/// An in-memory partitioned store.
///
/// This store keeps all records in memory and is suitable for:
/// - Unit tests
/// - Integration tests that simulate a restart by sharing one store
///   between two successive owners
/// - Ephemeral queues that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use outbox_storage::{DurableStore, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.put_record("settings", "user-settings", b"{}").unwrap();
/// assert_eq!(store.record_count("settings"), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    partitions: RwLock<BTreeMap<String, Partition>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records in a partition.
    #[must_use]
    pub fn record_count(&self, partition: &str) -> usize {
        self.partitions
            .read()
            .get(partition)
            .map_or(0, BTreeMap::len)
    }

    /// Returns the names of all non-empty partitions.
    #[must_use]
    pub fn partitions(&self) -> Vec<String> {
        self.partitions
            .read()
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl DurableStore for InMemoryStore {
    fn put_record(&self, partition: &str, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_name("partition", partition)?;
        validate_name("key", key)?;

        self.partitions
            .write()
            .entry(partition.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get_record(&self, partition: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .partitions
            .read()
            .get(partition)
            .and_then(|records| records.get(key))
            .cloned())
    }

    fn get_all_records(&self, partition: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .partitions
            .read()
            .get(partition)
            .map(|records| {
                records
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn delete_record(&self, partition: &str, key: &str) -> StorageResult<()> {
        if let Some(records) = self.partitions.write().get_mut(partition) {
            records.remove(key);
        }
        Ok(())
    }

    fn clear_partition(&self, partition: &str) -> StorageResult<()> {
        self.partitions.write().remove(partition);
        Ok(())
    }
}
