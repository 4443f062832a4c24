//! Reconciliation engine: drains the operation log against the remote API.

use crate::config::OutboxConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{OutboxResult, RemoteError};
use crate::oplog::OperationLog;
use crate::record::{MutationKind, MutationRecord, OperationId};
use crate::remote::{RemoteApi, RemoteRequest};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, error, info, warn};

/// State of the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// No drain in progress.
    Idle,
    /// A drain pass is running.
    Draining,
}

/// Why a drain request did not start a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another pass is already running.
    AlreadyDraining,
    /// The connectivity monitor reports offline.
    Offline,
    /// Nothing is queued.
    Empty,
}

/// A record dropped after reaching the retry ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedRecord {
    /// The record as it was when dropped, with its final attempt count.
    pub record: MutationRecord,
    /// The error of the last attempt.
    pub error: RemoteError,
}

/// Summary of one completed drain pass.
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    /// Records in the pass snapshot.
    pub attempted: usize,
    /// Records the remote accepted.
    pub replayed: usize,
    /// Records that failed and stay queued.
    pub retained: usize,
    /// Records dropped at the retry ceiling.
    pub dropped: Vec<DroppedRecord>,
    /// Whether the single log write at the end of the pass succeeded.
    pub persisted: bool,
    /// Wall time of the pass.
    pub duration: Duration,
}

/// Result of a drain request.
#[derive(Debug, Clone)]
pub enum DrainOutcome {
    /// The guard rejected the request; nothing was done.
    Skipped(SkipReason),
    /// A pass ran to completion.
    Completed(DrainReport),
}

impl DrainOutcome {
    /// Returns the report if a pass ran.
    pub fn report(&self) -> Option<&DrainReport> {
        match self {
            DrainOutcome::Completed(report) => Some(report),
            DrainOutcome::Skipped(_) => None,
        }
    }

    /// Returns true if the request was rejected by the guard.
    pub fn is_skipped(&self) -> bool {
        matches!(self, DrainOutcome::Skipped(_))
    }
}

/// Observable replay events.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileEvent {
    /// The remote accepted a record; it has been removed.
    Replayed {
        /// Record id.
        id: OperationId,
        /// Record kind.
        kind: MutationKind,
        /// Record target.
        target: String,
    },
    /// A replay failed below the ceiling; the record stays queued.
    Retrying {
        /// Record id.
        id: OperationId,
        /// Failed attempts so far.
        attempts: u32,
        /// The failure.
        error: RemoteError,
    },
    /// A record reached the retry ceiling and was removed from the queue.
    Dropped(DroppedRecord),
}

/// Statistics about drain passes.
#[derive(Debug, Clone, Default)]
pub struct ReconcileStats {
    /// Drain passes that ran to completion.
    pub passes_completed: u64,
    /// Drain requests rejected by the guard.
    pub passes_skipped: u64,
    /// Records replayed successfully.
    pub replayed: u64,
    /// Failed replay attempts, including the ones that led to a drop.
    pub failed_attempts: u64,
    /// Records dropped at the retry ceiling.
    pub dropped: u64,
    /// Time the last pass completed.
    pub last_pass_time: Option<Instant>,
    /// Last remote or persistence error.
    pub last_error: Option<String>,
}

/// Releases the single-flight flag when a pass ends, however it ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The reconciliation engine.
///
/// Owns the injected [`OperationLog`], reads the [`ConnectivityMonitor`]
/// and replays queued records through a [`RemoteApi`].
///
/// # Key Invariants
///
/// - At most one drain pass runs at a time; concurrent requests return
///   [`SkipReason::AlreadyDraining`] instead of waiting
/// - A pass replays exactly the records present when it started, in order,
///   one request at a time
/// - Records enqueued during a pass wait for the next pass
/// - Each pass ends with a single log write
/// - Remote and persistence failures never escape a drain
pub struct Reconciler<R: RemoteApi> {
    config: OutboxConfig,
    log: Arc<OperationLog>,
    remote: Arc<R>,
    connectivity: Arc<ConnectivityMonitor>,
    draining: AtomicBool,
    wake: Notify,
    events: broadcast::Sender<ReconcileEvent>,
    stats: RwLock<ReconcileStats>,
}

impl<R: RemoteApi> Reconciler<R> {
    /// Creates a reconciler over an already loaded log.
    pub fn new(
        config: OutboxConfig,
        log: Arc<OperationLog>,
        remote: Arc<R>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            log,
            remote,
            connectivity,
            draining: AtomicBool::new(false),
            wake: Notify::new(),
            events,
            stats: RwLock::new(ReconcileStats::default()),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> DrainState {
        if self.draining.load(Ordering::Acquire) {
            DrainState::Draining
        } else {
            DrainState::Idle
        }
    }

    /// Gets the current stats.
    pub fn stats(&self) -> ReconcileStats {
        self.stats.read().clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OutboxConfig {
        &self.config
    }

    /// Returns the operation log.
    pub fn log(&self) -> &Arc<OperationLog> {
        &self.log
    }

    /// Returns the connectivity monitor.
    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    /// Number of records waiting to be synced.
    pub fn pending_count(&self) -> usize {
        self.log.size()
    }

    /// Subscribes to replay events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReconcileEvent> {
        self.events.subscribe()
    }

    /// Queues a mutation and, when online, wakes the scheduler so it
    /// drains without waiting for the next timer tick.
    ///
    /// # Errors
    ///
    /// Propagates the log's persistence error; the record is still queued.
    pub fn enqueue(
        &self,
        kind: MutationKind,
        target: impl Into<String>,
        payload: serde_json::Value,
    ) -> OutboxResult<OperationId> {
        let result = self.log.enqueue(kind, target, payload);
        if self.connectivity.is_online() {
            self.wake.notify_one();
        }
        result
    }

    /// Resolves when an enqueue asks for an opportunistic drain.
    pub(crate) async fn woken(&self) {
        self.wake.notified().await;
    }

    /// Runs one guarded drain pass.
    ///
    /// Returns immediately with [`DrainOutcome::Skipped`] if a pass is
    /// already running, the device is offline, or the log is empty.
    pub async fn drain(&self) -> DrainOutcome {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return self.skip(SkipReason::AlreadyDraining);
        }
        let _guard = DrainGuard(&self.draining);

        if !self.connectivity.is_online() {
            return self.skip(SkipReason::Offline);
        }

        if self.log.is_dirty() {
            if let Err(e) = self.log.flush() {
                warn!(error = %e, "operation log still not persisted");
            }
        }

        let snapshot = self.log.snapshot();
        if snapshot.is_empty() {
            return self.skip(SkipReason::Empty);
        }

        DrainOutcome::Completed(self.run_pass(snapshot).await)
    }

    fn skip(&self, reason: SkipReason) -> DrainOutcome {
        debug!(?reason, "drain skipped");
        self.stats.write().passes_skipped += 1;
        DrainOutcome::Skipped(reason)
    }

    async fn run_pass(&self, snapshot: Vec<MutationRecord>) -> DrainReport {
        let start = Instant::now();
        let ceiling = self.config.retry_ceiling;
        let mut report = DrainReport {
            attempted: snapshot.len(),
            ..DrainReport::default()
        };
        let mut removed = HashSet::new();
        let mut failed = HashSet::new();
        let mut last_error = None;

        debug!(records = snapshot.len(), "drain pass started");

        for record in snapshot {
            let request = RemoteRequest::from_record(&record);
            match self.remote.perform(&request).await {
                Ok(()) => {
                    debug!(id = %record.id, kind = %record.kind, target = %record.target, "operation replayed");
                    removed.insert(record.id);
                    report.replayed += 1;
                    self.emit(ReconcileEvent::Replayed {
                        id: record.id,
                        kind: record.kind,
                        target: record.target,
                    });
                }
                Err(err) => {
                    let attempts = record.attempts.saturating_add(1);
                    last_error = Some(err.to_string());

                    if attempts >= ceiling {
                        error!(
                            id = %record.id,
                            kind = %record.kind,
                            target = %record.target,
                            attempts,
                            error = %err,
                            "operation dropped after reaching retry ceiling"
                        );
                        removed.insert(record.id);
                        let dropped = DroppedRecord {
                            record: MutationRecord { attempts, ..record },
                            error: err,
                        };
                        self.emit(ReconcileEvent::Dropped(dropped.clone()));
                        report.dropped.push(dropped);
                    } else {
                        debug!(id = %record.id, attempts, error = %err, "operation replay failed, will retry");
                        failed.insert(record.id);
                        report.retained += 1;
                        self.emit(ReconcileEvent::Retrying {
                            id: record.id,
                            attempts,
                            error: err,
                        });
                    }
                }
            }
        }

        report.persisted = match self.log.commit_pass(&failed, &removed) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to persist drain pass, keeping in-memory log");
                last_error = Some(e.to_string());
                false
            }
        };
        report.duration = start.elapsed();

        {
            let mut stats = self.stats.write();
            stats.passes_completed += 1;
            stats.replayed += report.replayed as u64;
            stats.failed_attempts += (report.retained + report.dropped.len()) as u64;
            stats.dropped += report.dropped.len() as u64;
            stats.last_pass_time = Some(Instant::now());
            if last_error.is_some() {
                stats.last_error = last_error;
            }
        }

        info!(
            attempted = report.attempted,
            replayed = report.replayed,
            retained = report.retained,
            dropped = report.dropped.len(),
            pending = self.log.size(),
            "drain pass completed"
        );
        report
    }

    fn emit(&self, event: ReconcileEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
