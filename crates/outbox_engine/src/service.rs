//! Startup wiring for the outbox components.

use crate::config::OutboxConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::OutboxResult;
use crate::observer::PendingCountObserver;
use crate::oplog::{LoadReport, OperationLog};
use crate::reconciler::{DrainOutcome, ReconcileEvent, Reconciler};
use crate::record::{MutationKind, OperationId};
use crate::remote::RemoteApi;
use crate::repository::OfflineRepository;
use crate::scheduler::{Scheduler, SchedulerHandle};
use outbox_storage::DurableStore;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// A running outbox: loaded log, reconciler, drain scheduler and
/// pending-count observer.
///
/// # Example
///
/// ```rust,no_run
/// use outbox_engine::{ConnectivityMonitor, MockRemote, MutationKind, Outbox, OutboxConfig};
/// use outbox_storage::InMemoryStore;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() {
/// let outbox = Outbox::start(
///     OutboxConfig::default(),
///     Arc::new(InMemoryStore::new()),
///     Arc::new(MockRemote::new()),
///     Arc::new(ConnectivityMonitor::new(false)),
/// );
///
/// outbox.enqueue(MutationKind::Create, "/api/tickets", json!({"type": "single"})).unwrap();
/// assert_eq!(outbox.pending_count(), 1);
/// outbox.shutdown().await;
/// # }
/// ```
pub struct Outbox<R: RemoteApi + 'static> {
    store: Arc<dyn DurableStore>,
    reconciler: Arc<Reconciler<R>>,
    observer: PendingCountObserver,
    scheduler: SchedulerHandle,
    load_report: LoadReport,
}

impl<R: RemoteApi + 'static> Outbox<R> {
    /// Loads the log from `store` and starts the background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: OutboxConfig,
        store: Arc<dyn DurableStore>,
        remote: Arc<R>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        let log = Arc::new(OperationLog::new(Arc::clone(&store), config.partition.clone()));
        let load_report = log.load();
        info!(
            restored = load_report.restored,
            skipped = load_report.skipped,
            online = connectivity.is_online(),
            "outbox started"
        );

        let observer = PendingCountObserver::spawn(Arc::clone(&log), config.pending_poll_interval);
        let reconciler = Arc::new(Reconciler::new(config, log, remote, connectivity));
        let scheduler = Scheduler::spawn(Arc::clone(&reconciler));

        Self {
            store,
            reconciler,
            observer,
            scheduler,
            load_report,
        }
    }

    /// What was restored from the store at startup.
    pub fn load_report(&self) -> LoadReport {
        self.load_report
    }

    /// Returns the reconciler.
    pub fn reconciler(&self) -> &Arc<Reconciler<R>> {
        &self.reconciler
    }

    /// Returns the connectivity monitor the host platform should feed.
    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        self.reconciler.connectivity()
    }

    /// Returns a repository for optimistic domain writes.
    pub fn repository(&self) -> OfflineRepository<R> {
        OfflineRepository::new(Arc::clone(&self.store), Arc::clone(&self.reconciler))
    }

    /// Queues a mutation; see [`Reconciler::enqueue`].
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
        self.reconciler.enqueue(kind, target, payload)
    }

    /// Runs a drain pass now, outside the scheduler.
    pub async fn sync_now(&self) -> DrainOutcome {
        self.reconciler.drain().await
    }

    /// Number of records waiting to be synced.
    pub fn pending_count(&self) -> usize {
        self.reconciler.pending_count()
    }

    /// Returns the pending-count observer.
    pub fn pending(&mut self) -> &mut PendingCountObserver {
        &mut self.observer
    }

    /// Subscribes to replay events, including drops at the retry ceiling.
    pub fn subscribe(&self) -> broadcast::Receiver<ReconcileEvent> {
        self.reconciler.subscribe()
    }

    /// Stops the scheduler, letting an in-progress pass finish.
    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
        info!(pending = self.reconciler.pending_count(), "outbox stopped");
    }
}
