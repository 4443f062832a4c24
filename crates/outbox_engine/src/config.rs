//! Configuration for the outbox engine.

use std::time::Duration;

/// Partition that holds the serialized operation log.
pub const DEFAULT_PARTITION: &str = "pending_operations";

/// Key of the single record inside [`DEFAULT_PARTITION`].
pub const LOG_KEY: &str = "operations";

/// Shortest timer period; tokio rejects a zero interval.
pub(crate) const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for the operation log, the reconciler and its scheduler.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Durable store partition owned by the operation log.
    pub partition: String,
    /// Failed attempts after which a record is dropped.
    pub retry_ceiling: u32,
    /// Period of the background drain timer.
    pub sync_interval: Duration,
    /// Period at which the pending-count observer polls the log.
    pub pending_poll_interval: Duration,
    /// Capacity of the reconcile event channel.
    pub event_capacity: usize,
}

impl OutboxConfig {
    /// Creates a configuration with the default policy.
    pub fn new() -> Self {
        Self {
            partition: DEFAULT_PARTITION.to_string(),
            retry_ceiling: 3,
            sync_interval: Duration::from_secs(30),
            pending_poll_interval: Duration::from_secs(5),
            event_capacity: 64,
        }
    }

    /// Creates a configuration that drops a record on its first failure.
    pub fn no_retry() -> Self {
        Self::new().with_retry_ceiling(1)
    }

    /// Sets the retry ceiling. Values below 1 are raised to 1.
    pub fn with_retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = ceiling.max(1);
        self
    }

    /// Sets the background drain interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the pending-count poll interval.
    pub fn with_pending_poll_interval(mut self, interval: Duration) -> Self {
        self.pending_poll_interval = interval;
        self
    }

    /// Sets the partition used for the operation log.
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    /// Sets the event channel capacity. Values below 1 are raised to 1.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self::new()
    }
}
