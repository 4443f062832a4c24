//! Optimistic local writes paired with queued remote mutations.

use crate::error::{OutboxError, OutboxResult};
use crate::reconciler::Reconciler;
use crate::record::{MutationKind, OperationId};
use crate::remote::RemoteApi;
use outbox_storage::DurableStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Domain-record access for offline-capable screens.
///
/// Every write lands in the record's own partition first, so local reads
/// reflect it at once, and is then queued for replay. Reads never fail:
/// a missing or unreadable partition reads as empty.
///
/// Domain partitions must differ from the operation log's partition.
pub struct OfflineRepository<R: RemoteApi> {
    store: Arc<dyn DurableStore>,
    reconciler: Arc<Reconciler<R>>,
}

impl<R: RemoteApi> OfflineRepository<R> {
    /// Creates a repository writing to `store` and queueing through `reconciler`.
    pub fn new(store: Arc<dyn DurableStore>, reconciler: Arc<Reconciler<R>>) -> Self {
        Self { store, reconciler }
    }

    /// Stores a new record locally and queues its creation at `target`.
    ///
    /// # Errors
    ///
    /// Fails without queueing if the local write fails; otherwise
    /// propagates the log's persistence error.
    pub fn create<T: Serialize>(
        &self,
        partition: &str,
        key: &str,
        target: &str,
        record: &T,
    ) -> OutboxResult<OperationId> {
        self.write(MutationKind::Create, partition, key, target, record)
    }

    /// Replaces a record locally and queues an update at `target`.
    ///
    /// # Errors
    ///
    /// Same as [`OfflineRepository::create`].
    pub fn update<T: Serialize>(
        &self,
        partition: &str,
        key: &str,
        target: &str,
        record: &T,
    ) -> OutboxResult<OperationId> {
        self.write(MutationKind::Update, partition, key, target, record)
    }

    /// Deletes a record locally and queues its deletion at `target`.
    ///
    /// # Errors
    ///
    /// Same as [`OfflineRepository::create`].
    pub fn delete(&self, partition: &str, key: &str, target: &str) -> OutboxResult<OperationId> {
        self.store.delete_record(partition, key)?;
        self.reconciler
            .enqueue(MutationKind::Delete, target, serde_json::Value::Null)
    }

    /// Reads one record, or `None` if it is missing or unreadable.
    pub fn load<T: DeserializeOwned>(&self, partition: &str, key: &str) -> Option<T> {
        match self.store.get_record(partition, key) {
            Ok(Some(bytes)) => decode(partition, key, &bytes),
            Ok(None) => None,
            Err(e) => {
                warn!(partition, key, error = %e, "failed to read offline record");
                None
            }
        }
    }

    /// Reads one record, falling back to `T::default()`.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, partition: &str, key: &str) -> T {
        self.load(partition, key).unwrap_or_default()
    }

    /// Reads every decodable record of a partition, ordered by key.
    pub fn load_all<T: DeserializeOwned>(&self, partition: &str) -> Vec<T> {
        match self.store.get_all_records(partition) {
            Ok(records) => records
                .iter()
                .filter_map(|(key, bytes)| decode(partition, key, bytes))
                .collect(),
            Err(e) => {
                warn!(partition, error = %e, "failed to read offline records");
                Vec::new()
            }
        }
    }

    fn write<T: Serialize>(
        &self,
        kind: MutationKind,
        partition: &str,
        key: &str,
        target: &str,
        record: &T,
    ) -> OutboxResult<OperationId> {
        let payload = serde_json::to_value(record).map_err(|e| OutboxError::Codec(e.to_string()))?;
        let bytes = serde_json::to_vec(&payload).map_err(|e| OutboxError::Codec(e.to_string()))?;

        self.store.put_record(partition, key, &bytes)?;
        self.reconciler.enqueue(kind, target, payload)
    }
}

fn decode<T: DeserializeOwned>(partition: &str, key: &str, bytes: &[u8]) -> Option<T> {
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(partition, key, error = %e, "skipping undecodable offline record");
            None
        }
    }
}
