//! Trigger sources feeding the reconciler's drain entrypoint.

use crate::config::MIN_INTERVAL;
use crate::reconciler::Reconciler;
use crate::remote::RemoteApi;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

/// What caused a drain attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The periodic timer fired.
    Timer,
    /// Connectivity went from offline to online.
    Online,
    /// A record was enqueued while online.
    Enqueue,
}

/// Runs the background drain loop.
///
/// Three sources converge on [`Reconciler::drain`]: the periodic timer
/// (fires regardless of connectivity, the first tick immediately),
/// offline-to-online transitions, and enqueue-time wake-ups. Triggers that
/// arrive while a pass runs are latched and served by the next loop turn;
/// the reconciler's guard makes redundant ones cheap no-ops.
pub struct Scheduler;

impl Scheduler {
    /// Spawns the drain loop on the current tokio runtime.
    ///
    /// Dropping the returned handle stops the loop as well.
    pub fn spawn<R: RemoteApi + 'static>(reconciler: Arc<Reconciler<R>>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        // Subscribe before spawning so a transition right after this call is not missed.
        let mut connectivity = reconciler.connectivity().subscribe();

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(reconciler.config().sync_interval.max(MIN_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let trigger = tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => Trigger::Timer,
                    changed = connectivity.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if !*connectivity.borrow_and_update() {
                            continue;
                        }
                        Trigger::Online
                    }
                    _ = reconciler.woken() => Trigger::Enqueue,
                };

                debug!(?trigger, "drain triggered");
                reconciler.drain().await;
            }

            debug!("drain scheduler stopped");
        });

        SchedulerHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to a running [`Scheduler`] loop.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops the loop and waits for it to exit.
    ///
    /// A pass already in progress runs to completion first.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }

    /// Returns true if the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
