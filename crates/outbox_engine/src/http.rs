//! HTTP implementation of the remote API.
//!
//! The actual HTTP client is abstracted via a trait so any library
//! (reqwest, hyper, a platform fetch bridge) can be plugged in.

use crate::error::{OutboxError, OutboxResult, RemoteError};
use crate::record::MutationKind;
use crate::remote::{RemoteApi, RemoteRequest};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

/// Header carrying the idempotency key on replayed creates.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// A single outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: &'static str,
    /// Absolute or base-relative URL.
    pub url: String,
    /// Request headers, in insertion order.
    pub headers: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Returns the first header value with the given name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The status line of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response status.
    ///
    /// Errors are transport failures (DNS, refused, reset); HTTP error
    /// statuses are returned as a normal response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// Configuration for [`HttpRemote`].
#[derive(Debug, Clone)]
pub struct HttpRemoteConfig {
    /// Prefix joined with each record's target. May be empty.
    pub base_url: String,
    /// Headers sent with every request.
    pub default_headers: Vec<(String, String)>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpRemoteConfig {
    /// Creates a configuration for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_headers: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Adds a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Replays mutations as JSON HTTP requests.
///
/// Create maps to `POST` with an [`IDEMPOTENCY_HEADER`], Update to
/// `PATCH`, Delete to a body-less `DELETE`. Any non-2xx status is a
/// failure.
pub struct HttpRemote<C: HttpClient> {
    config: HttpRemoteConfig,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpRemote<C> {
    /// Creates a new HTTP remote.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::Config`] if the timeout is zero.
    pub fn new(config: HttpRemoteConfig, client: C) -> OutboxResult<Self> {
        if config.timeout.is_zero() {
            return Err(OutboxError::Config("HTTP timeout must be non-zero".into()));
        }
        Ok(Self {
            config,
            client,
            last_error: RwLock::new(None),
        })
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Builds the HTTP request for a replayed mutation.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Encode`] if the payload cannot be serialized.
    pub fn build_request(&self, request: &RemoteRequest) -> Result<HttpRequest, RemoteError> {
        let mut headers = Vec::with_capacity(self.config.default_headers.len() + 2);

        let body = if request.kind.has_body() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
            Some(serde_json::to_vec(&request.payload).map_err(|e| RemoteError::Encode(e.to_string()))?)
        } else {
            None
        };

        headers.extend(self.config.default_headers.iter().cloned());

        if request.kind == MutationKind::Create {
            headers.push((IDEMPOTENCY_HEADER.to_string(), request.idempotency_key.clone()));
        }

        Ok(HttpRequest {
            method: request.kind.http_method(),
            url: join_url(&self.config.base_url, &request.target),
            headers,
            body,
        })
    }

    fn record_error(&self, err: &RemoteError) {
        *self.last_error.write() = Some(err.to_string());
    }
}

#[async_trait]
impl<C: HttpClient> RemoteApi for HttpRemote<C> {
    async fn perform(&self, request: &RemoteRequest) -> Result<(), RemoteError> {
        let http = self.build_request(request)?;
        debug!(method = http.method, url = %http.url, "replaying mutation");

        let result = match tokio::time::timeout(self.config.timeout, self.client.send(http)).await {
            Err(_) => Err(RemoteError::Timeout),
            Ok(Err(message)) => Err(RemoteError::transport_retryable(message)),
            Ok(Ok(response)) if response.is_success() => Ok(()),
            Ok(Ok(response)) => Err(RemoteError::Status {
                status: response.status,
                reason: response.reason,
            }),
        };

        match &result {
            Ok(()) => *self.last_error.write() = None,
            Err(e) => self.record_error(e),
        }
        result
    }
}

fn join_url(base: &str, target: &str) -> String {
    if base.is_empty() || target.starts_with("http://") || target.starts_with("https://") {
        return target.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        target.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MutationRecord;
    use parking_lot::Mutex;
    use serde_json::json;

    struct TestClient {
        sent: Mutex<Vec<HttpRequest>>,
        response: Mutex<Result<HttpResponse, String>>,
        stall: bool,
    }

    impl TestClient {
        fn new(status: u16, reason: &str) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                response: Mutex::new(Ok(HttpResponse {
                    status,
                    reason: reason.to_string(),
                })),
                stall: false,
            }
        }
    }

    #[async_trait]
    impl HttpClient for TestClient {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
            self.sent.lock().push(request);
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.response.lock().clone()
        }
    }

    fn remote(client: TestClient) -> HttpRemote<TestClient> {
        let config = HttpRemoteConfig::new("https://transit.example.com/").with_header("x-user-id", "1");
        HttpRemote::new(config, client).unwrap()
    }

    fn request(kind: MutationKind, target: &str, payload: serde_json::Value) -> RemoteRequest {
        RemoteRequest::from_record(&MutationRecord::new(kind, target, payload))
    }

    #[test]
    fn create_is_post_with_idempotency_key() {
        let remote = remote(TestClient::new(201, "Created"));
        let req = request(MutationKind::Create, "/api/tickets", json!({"type": "single"}));
        let http = remote.build_request(&req).unwrap();

        assert_eq!(http.method, "POST");
        assert_eq!(http.url, "https://transit.example.com/api/tickets");
        assert_eq!(http.header("content-type"), Some("application/json"));
        assert_eq!(http.header("x-user-id"), Some("1"));
        assert_eq!(http.header(IDEMPOTENCY_HEADER), Some(req.idempotency_key.as_str()));
        assert_eq!(http.body, Some(br#"{"type":"single"}"#.to_vec()));
    }

    #[test]
    fn update_is_patch_without_key() {
        let remote = remote(TestClient::new(200, "OK"));
        let http = remote
            .build_request(&request(MutationKind::Update, "/api/settings", json!({"vibrationEnabled": false})))
            .unwrap();

        assert_eq!(http.method, "PATCH");
        assert!(http.header(IDEMPOTENCY_HEADER).is_none());
        assert!(http.body.is_some());
    }

    #[test]
    fn delete_has_no_body() {
        let remote = remote(TestClient::new(204, "No Content"));
        let http = remote
            .build_request(&request(MutationKind::Delete, "api/tickets/4", json!(null)))
            .unwrap();

        assert_eq!(http.method, "DELETE");
        assert_eq!(http.url, "https://transit.example.com/api/tickets/4");
        assert!(http.body.is_none());
        assert!(http.header("content-type").is_none());
    }

    #[test]
    fn relative_urls_without_base() {
        assert_eq!(join_url("", "/api/feedback"), "/api/feedback");
        assert_eq!(join_url("https://a.example", "https://b.example/x"), "https://b.example/x");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = HttpRemoteConfig::new("").with_timeout(Duration::ZERO);
        assert!(matches!(
            HttpRemote::new(config, TestClient::new(200, "OK")),
            Err(OutboxError::Config(_))
        ));
    }

    #[tokio::test]
    async fn success_status() {
        let remote = remote(TestClient::new(201, "Created"));
        let result = remote
            .perform(&request(MutationKind::Create, "/api/journeys", json!({})))
            .await;
        assert!(result.is_ok());
        assert!(remote.last_error().is_none());
        assert_eq!(remote.client.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn error_status_fails() {
        let remote = remote(TestClient::new(503, "Service Unavailable"));
        let result = remote
            .perform(&request(MutationKind::Update, "/api/settings", json!({})))
            .await;

        assert_eq!(
            result,
            Err(RemoteError::Status {
                status: 503,
                reason: "Service Unavailable".into()
            })
        );
        assert_eq!(remote.last_error().as_deref(), Some("HTTP 503: Service Unavailable"));
    }

    #[tokio::test]
    async fn transport_error_is_retryable() {
        let client = TestClient::new(200, "OK");
        *client.response.lock() = Err("connection refused".into());
        let remote = remote(client);

        let result = remote
            .perform(&request(MutationKind::Create, "/api/feedback", json!({})))
            .await;
        assert!(matches!(result, Err(ref e) if e.is_retryable()));
    }

    #[tokio::test]
    async fn stalled_request_times_out() {
        let mut client = TestClient::new(200, "OK");
        client.stall = true;
        let config = HttpRemoteConfig::new("").with_timeout(Duration::from_millis(20));
        let remote = HttpRemote::new(config, client).unwrap();

        let result = remote
            .perform(&request(MutationKind::Create, "/api/tickets", json!({})))
            .await;
        assert_eq!(result, Err(RemoteError::Timeout));
    }
}
