//! Remote API abstraction the reconciler replays against.

use crate::error::RemoteError;
use crate::record::{MutationKind, MutationRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One replayed mutation as seen by the remote side.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    /// Create, update or delete.
    pub kind: MutationKind,
    /// Resource path.
    pub target: String,
    /// Domain data.
    pub payload: serde_json::Value,
    /// Key the server must deduplicate creates on.
    pub idempotency_key: String,
}

impl RemoteRequest {
    /// Builds the request for a queued record.
    pub fn from_record(record: &MutationRecord) -> Self {
        Self {
            kind: record.kind,
            target: record.target.clone(),
            payload: record.payload.clone(),
            idempotency_key: record.id.idempotency_key(),
        }
    }
}

/// Performs the network call for one mutation.
///
/// Success or failure is the only thing the reconciler observes.
///
/// # Contract
///
/// Delivery is at-least-once: a request whose response was lost is sent
/// again on the next pass. Implementations **must** forward
/// [`RemoteRequest::idempotency_key`] on creates and the server **must**
/// treat a repeated key as the same resource, or retries will duplicate it.
/// Updates and deletes are expected to be naturally idempotent.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Replays one mutation.
    async fn perform(&self, request: &RemoteRequest) -> Result<(), RemoteError>;
}

/// Scripted response of a [`MockRemote`].
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Succeed.
    Ok,
    /// Fail with the given error.
    Fail(RemoteError),
}

/// A scriptable remote for testing.
///
/// Responses are taken from a queue; once it is empty the default
/// response is used. Every request is recorded in call order.
#[derive(Debug)]
pub struct MockRemote {
    script: Mutex<VecDeque<MockResponse>>,
    default: Mutex<MockResponse>,
    calls: Mutex<Vec<RemoteRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl MockRemote {
    /// Creates a mock that always succeeds.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(MockResponse::Ok),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Mutex::new(None),
        }
    }

    /// Creates a mock that always fails with a retryable transport error.
    pub fn failing() -> Self {
        let remote = Self::new();
        remote.set_default(MockResponse::Fail(RemoteError::transport_retryable(
            "connection refused",
        )));
        remote
    }

    /// Sets the response used once the script is exhausted.
    pub fn set_default(&self, response: MockResponse) {
        *self.default.lock() = response;
    }

    /// Queues responses for the next calls.
    pub fn push_responses(&self, responses: impl IntoIterator<Item = MockResponse>) {
        self.script.lock().extend(responses);
    }

    /// Makes every call wait before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Returns every request received, in order.
    pub fn calls(&self) -> Vec<RemoteRequest> {
        self.calls.lock().clone()
    }

    /// Number of requests received.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of requests that were ever in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn perform(&self, request: &RemoteRequest) -> Result<(), RemoteError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().push(request.clone());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.lock().clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match response {
            MockResponse::Ok => Ok(()),
            MockResponse::Fail(e) => Err(e),
        }
    }
}
