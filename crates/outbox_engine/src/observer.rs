//! Pending-count exposure for sync-status indicators.

use crate::config::MIN_INTERVAL;
use crate::oplog::OperationLog;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Read-only view of how many records wait to be synced.
///
/// Supports pull (`current`) and periodic poll: a background task reads
/// the log size every interval and publishes it when it changes. The poll
/// task stops when the observer is dropped.
#[derive(Debug)]
pub struct PendingCountObserver {
    log: Arc<OperationLog>,
    rx: watch::Receiver<usize>,
    task: JoinHandle<()>,
}

impl PendingCountObserver {
    /// Starts polling `log` every `interval` on the current tokio runtime.
    pub fn spawn(log: Arc<OperationLog>, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(log.size());
        let polled = Arc::clone(&log);

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval.max(MIN_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let size = polled.size();
                tx.send_if_modified(|current| {
                    if *current == size {
                        false
                    } else {
                        *current = size;
                        true
                    }
                });
                if tx.is_closed() {
                    break;
                }
            }
        });

        Self { log, rx, task }
    }

    /// Reads the pending count right now.
    pub fn current(&self) -> usize {
        self.log.size()
    }

    /// Returns the value published by the last poll.
    pub fn last_polled(&self) -> usize {
        *self.rx.borrow()
    }

    /// Waits for the next published change and returns the new count.
    ///
    /// Returns `None` if the poll task has stopped.
    pub async fn changed(&mut self) -> Option<usize> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Returns a receiver for presentation code that wants its own handle.
    pub fn receiver(&self) -> watch::Receiver<usize> {
        self.rx.clone()
    }
}

impl Drop for PendingCountObserver {
    fn drop(&mut self) {
        self.task.abort();
    }
}
