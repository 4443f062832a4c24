//! Durable, ordered log of pending mutations.

use crate::config::LOG_KEY;
use crate::error::{OutboxError, OutboxResult};
use crate::record::{decode_log, encode_log, DecodedLog, MutationKind, MutationRecord, OperationId};
use outbox_storage::DurableStore;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of [`OperationLog::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Records restored into memory.
    pub restored: usize,
    /// Persisted elements that were malformed and skipped.
    pub skipped: usize,
    /// Whether the persisted log could not be read at all.
    pub unreadable: bool,
}

/// The ordered list of mutations that remain to be synced.
///
/// The log is the only component that adds or removes records, and the
/// only writer of its durable partition. Every mutation rewrites the full
/// log under one key, so a persist that fails is caught up by the next one
/// that succeeds.
///
/// # Invariants
///
/// - Records stay in enqueue order
/// - `size()` equals the length of the last successfully persisted log
///   whenever no persist has failed since
/// - A failed persist never alters the in-memory records
pub struct OperationLog {
    store: Arc<dyn DurableStore>,
    partition: String,
    records: Mutex<Vec<MutationRecord>>,
    dirty: AtomicBool,
}

impl OperationLog {
    /// Creates an empty log over `partition` without reading the store.
    ///
    /// Call [`OperationLog::load`] before use to restore persisted records.
    pub fn new(store: Arc<dyn DurableStore>, partition: impl Into<String>) -> Self {
        Self {
            store,
            partition: partition.into(),
            records: Mutex::new(Vec::new()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Creates a log and restores it from the store.
    pub fn open(store: Arc<dyn DurableStore>, partition: impl Into<String>) -> Self {
        let log = Self::new(store, partition);
        log.load();
        log
    }

    /// Returns the partition this log persists to.
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Rebuilds the in-memory log from the durable store.
    ///
    /// Never fails: an empty or unreadable store yields an empty log and
    /// malformed records are skipped one by one.
    pub fn load(&self) -> LoadReport {
        let mut report = LoadReport::default();

        let decoded = match read_persisted(self.store.as_ref(), &self.partition) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(partition = %self.partition, error = %e, "operation log unreadable, starting empty");
                report.unreadable = true;
                DecodedLog::default()
            }
        };

        for (index, reason) in &decoded.skipped {
            warn!(partition = %self.partition, index, %reason, "skipping malformed queued operation");
        }

        report.restored = decoded.records.len();
        report.skipped = decoded.skipped.len();
        *self.records.lock() = decoded.records;
        self.dirty.store(false, Ordering::SeqCst);

        debug!(partition = %self.partition, restored = report.restored, skipped = report.skipped, "operation log loaded");
        report
    }

    /// Appends a new mutation and persists the log.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::NotPersisted`] if the store write fails. The
    /// record is still queued in memory in that case.
    pub fn enqueue(
        &self,
        kind: MutationKind,
        target: impl Into<String>,
        payload: serde_json::Value,
    ) -> OutboxResult<OperationId> {
        let record = MutationRecord::new(kind, target, payload);
        let id = record.id;

        let mut records = self.records.lock();
        records.push(record);
        debug!(%id, %kind, pending = records.len(), "operation enqueued");

        self.persist(&records).map_err(|e| match e {
            OutboxError::Storage(source) => OutboxError::NotPersisted { id, source },
            other => other,
        })?;
        Ok(id)
    }

    /// Returns a copy of the current log, in order.
    pub fn snapshot(&self) -> Vec<MutationRecord> {
        self.records.lock().clone()
    }

    /// Removes the named records and persists the log.
    ///
    /// Ids that are no longer present are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails; the records are removed
    /// from memory regardless.
    pub fn remove(&self, ids: &HashSet<OperationId>) -> OutboxResult<()> {
        self.commit_pass(&HashSet::new(), ids)
    }

    /// Applies the result of one drain pass in a single persist.
    ///
    /// Records in `failed` that are still queued get their attempt counter
    /// bumped; records in `removed` are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails; memory is updated regardless.
    pub fn commit_pass(
        &self,
        failed: &HashSet<OperationId>,
        removed: &HashSet<OperationId>,
    ) -> OutboxResult<()> {
        let mut records = self.records.lock();
        let before = records.len();

        records.retain(|record| !removed.contains(&record.id));
        for record in records.iter_mut().filter(|r| failed.contains(&r.id)) {
            record.attempts = record.attempts.saturating_add(1);
        }

        if before == records.len() && failed.is_empty() && !self.is_dirty() {
            return Ok(());
        }
        self.persist(&records)
    }

    /// Removes every queued record and clears the partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition cannot be cleared.
    pub fn clear(&self) -> OutboxResult<()> {
        let mut records = self.records.lock();
        records.clear();
        match self.store.clear_partition(&self.partition) {
            Ok(()) => {
                self.dirty.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                warn!(partition = %self.partition, error = %e, "failed to clear operation log");
                self.dirty.store(true, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Returns true if the last persist failed and memory is ahead of the store.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Retries a failed persist. No-op when the store is up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails again.
    pub fn flush(&self) -> OutboxResult<()> {
        if !self.is_dirty() {
            return Ok(());
        }
        let records = self.records.lock();
        self.persist(&records)
    }

    /// Number of pending records.
    pub fn size(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Writes the full log. Called with the records lock held so writes
    /// reach the store in the same order as the in-memory mutations.
    fn persist(&self, records: &[MutationRecord]) -> OutboxResult<()> {
        let result = encode_log(records).and_then(|bytes| {
            self.store
                .put_record(&self.partition, LOG_KEY, &bytes)
                .map_err(OutboxError::from)
        });

        match &result {
            Ok(()) => self.dirty.store(false, Ordering::SeqCst),
            Err(e) => {
                warn!(partition = %self.partition, pending = records.len(), error = %e, "failed to persist operation log");
                self.dirty.store(true, Ordering::SeqCst);
            }
        }
        result
    }
}

impl std::fmt::Debug for OperationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationLog")
            .field("partition", &self.partition)
            .field("size", &self.size())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

/// Reads the persisted log of `partition` straight from a store.
///
/// Returns an empty log when nothing was ever persisted.
///
/// # Errors
///
/// Returns an error if the store read fails or the outer array is unreadable.
pub fn read_persisted(store: &dyn DurableStore, partition: &str) -> OutboxResult<DecodedLog> {
    match store.get_record(partition, LOG_KEY)? {
        Some(bytes) => decode_log(&bytes),
        None => Ok(DecodedLog::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbox_storage::{InMemoryStore, StorageError, StorageResult};
    use proptest::prelude::*;
    use serde_json::json;

    /// Store wrapper whose writes can be switched off.
    struct FlakyStore {
        inner: InMemoryStore,
        fail_writes: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: InMemoryStore::new(),
                fail_writes: AtomicBool::new(false),
            }
        }

        fn set_failing(&self, failing: bool) {
            self.fail_writes.store(failing, Ordering::SeqCst);
        }
    }

    impl DurableStore for FlakyStore {
        fn put_record(&self, partition: &str, key: &str, value: &[u8]) -> StorageResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("disk full".into()));
            }
            self.inner.put_record(partition, key, value)
        }

        fn get_record(&self, partition: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
            self.inner.get_record(partition, key)
        }

        fn get_all_records(&self, partition: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
            self.inner.get_all_records(partition)
        }

        fn delete_record(&self, partition: &str, key: &str) -> StorageResult<()> {
            self.inner.delete_record(partition, key)
        }

        fn clear_partition(&self, partition: &str) -> StorageResult<()> {
            self.inner.clear_partition(partition)
        }
    }

    fn create_log() -> (Arc<InMemoryStore>, OperationLog) {
        let store = Arc::new(InMemoryStore::new());
        let log = OperationLog::open(store.clone(), "pending_operations");
        (store, log)
    }

    fn persisted_len(store: &dyn DurableStore) -> usize {
        read_persisted(store, "pending_operations").unwrap().records.len()
    }

    #[test]
    fn enqueue_appends_and_persists() {
        let (store, log) = create_log();

        let id = log
            .enqueue(MutationKind::Create, "/api/tickets", json!({"type": "single"}))
            .unwrap();

        assert_eq!(log.size(), 1);
        assert_eq!(persisted_len(store.as_ref()), 1);
        let snapshot = log.snapshot();
        assert_eq!(snapshot[0].id, id);
        assert_eq!(snapshot[0].attempts, 0);
    }

    #[test]
    fn snapshot_does_not_mutate() {
        let (_store, log) = create_log();
        log.enqueue(MutationKind::Create, "/api/tickets", json!({})).unwrap();

        let mut snapshot = log.snapshot();
        snapshot.clear();
        assert_eq!(log.size(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let (store, log) = create_log();
        let a = log.enqueue(MutationKind::Create, "/api/tickets", json!({})).unwrap();
        let b = log.enqueue(MutationKind::Update, "/api/settings", json!({})).unwrap();

        let ids: HashSet<_> = [a].into_iter().collect();
        log.remove(&ids).unwrap();
        log.remove(&ids).unwrap();

        assert_eq!(log.size(), 1);
        assert_eq!(log.snapshot()[0].id, b);
        assert_eq!(persisted_len(store.as_ref()), 1);

        let unknown: HashSet<_> = [OperationId::generate()].into_iter().collect();
        log.remove(&unknown).unwrap();
        assert_eq!(log.size(), 1);
    }

    #[test]
    fn commit_pass_bumps_and_drops() {
        let (store, log) = create_log();
        let a = log.enqueue(MutationKind::Create, "/api/tickets", json!({})).unwrap();
        let b = log.enqueue(MutationKind::Update, "/api/settings", json!({})).unwrap();
        let c = log.enqueue(MutationKind::Delete, "/api/tickets/1", json!(null)).unwrap();

        let failed: HashSet<_> = [b].into_iter().collect();
        let removed: HashSet<_> = [a, c].into_iter().collect();
        log.commit_pass(&failed, &removed).unwrap();

        let persisted = read_persisted(store.as_ref(), "pending_operations").unwrap().records;
        assert_eq!(persisted, log.snapshot());
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id, b);
        assert_eq!(persisted[0].attempts, 1);
    }

    #[test]
    fn load_restores_order() {
        let (store, log) = create_log();
        let ids: Vec<_> = ["/a", "/b", "/c"]
            .iter()
            .map(|t| log.enqueue(MutationKind::Create, *t, json!({})).unwrap())
            .collect();
        drop(log);

        let reopened = OperationLog::open(store, "pending_operations");
        let restored: Vec<_> = reopened.snapshot().into_iter().map(|r| r.id).collect();
        assert_eq!(restored, ids);
    }

    #[test]
    fn load_empty_store() {
        let store = Arc::new(InMemoryStore::new());
        let log = OperationLog::new(store, "pending_operations");
        let report = log.load();
        assert_eq!(report, LoadReport::default());
        assert!(log.is_empty());
    }

    #[test]
    fn load_unreadable_store_starts_empty() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_record("pending_operations", LOG_KEY, b"\xffnot a log")
            .unwrap();

        let log = OperationLog::new(store, "pending_operations");
        let report = log.load();
        assert!(report.unreadable);
        assert!(log.is_empty());
    }

    #[test]
    fn failed_persist_keeps_memory_and_catches_up() {
        let store = Arc::new(FlakyStore::new());
        let log = OperationLog::open(store.clone(), "pending_operations");
        log.enqueue(MutationKind::Create, "/a", json!({})).unwrap();

        store.set_failing(true);
        let result = log.enqueue(MutationKind::Create, "/b", json!({}));
        let Err(OutboxError::NotPersisted { id, .. }) = result else {
            panic!("expected NotPersisted, got {:?}", result);
        };
        assert_eq!(log.size(), 2);
        assert_eq!(log.snapshot()[1].id, id);
        assert!(log.is_dirty());
        assert_eq!(persisted_len(store.as_ref()), 1);

        store.set_failing(false);
        log.flush().unwrap();
        assert!(!log.is_dirty());
        assert_eq!(persisted_len(store.as_ref()), 2);
    }

    #[test]
    fn clear_empties_log_and_partition() {
        let (store, log) = create_log();
        log.enqueue(MutationKind::Create, "/a", json!({})).unwrap();
        log.clear().unwrap();

        assert!(log.is_empty());
        assert_eq!(persisted_len(store.as_ref()), 0);
    }

    proptest! {
        #[test]
        fn persisted_log_matches_memory(ops in prop::collection::vec((0u8..3, any::<bool>()), 1..24)) {
            let (store, log) = create_log();

            for (kind, remove_first) in ops {
                let kind = match kind {
                    0 => MutationKind::Create,
                    1 => MutationKind::Update,
                    _ => MutationKind::Delete,
                };
                log.enqueue(kind, "/api/resource", json!({"kind": kind.to_string()})).unwrap();

                if remove_first {
                    let first: HashSet<_> = log.snapshot().first().map(|r| r.id).into_iter().collect();
                    log.remove(&first).unwrap();
                }

                let persisted = read_persisted(store.as_ref(), "pending_operations").unwrap().records;
                prop_assert_eq!(persisted.len(), log.size());
                prop_assert_eq!(persisted, log.snapshot());
            }
        }
    }
}
