//! Online/offline state shared between the platform and the engine.

use tokio::sync::watch;
use tracing::info;

/// Single authoritative connectivity signal.
///
/// The host platform feeds transitions in through [`set_online`]; the
/// scheduler subscribes and starts a drain on every offline-to-online
/// transition. Going offline only updates the state: in-flight requests
/// are left to fail on their own.
///
/// No debouncing is done. Rapid flapping produces redundant drain
/// triggers, which the reconciler's single-flight guard absorbs.
///
/// [`set_online`]: ConnectivityMonitor::set_online
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with the given initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Returns the current state.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Records a platform connectivity event.
    ///
    /// Returns true if this was a transition. Subscribers are only
    /// notified on transitions.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            info!(online, "connectivity changed");
        }
        changed
    }

    /// Subscribes to transitions. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ConnectivityMonitor {
    /// Assumes online, matching a host that reports no connectivity API.
    fn default() -> Self {
        Self::new(true)
    }
}
