//! Reference HTTP transport.
//!
//! Speaks the JSON sync protocol over three endpoints:
//!
//! - `GET {base}/sync/pull?since={ts}`
//! - `POST {base}/sync/push`
//! - `GET {base}/health` (any 2xx means online)
//!
//! The actual HTTP client is abstracted behind [`HttpClient`] so this crate
//! does not pin a client library; bind it to reqwest, ureq, hyper, or the
//! in-process [`LoopbackClient`].

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use docsync_protocol::{ChangeBatch, PullResponse, PushResponse, Timestamp};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// A minimal HTTP response: status code and raw body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to bind the transport to an HTTP library. Errors
/// are reported as strings; the transport classifies them as retryable.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpResponse, String>;

    /// Sends a POST request with a body.
    fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<HttpResponse, String>;
}

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Base URL of the sync server (e.g. `https://sync.example.com`).
    pub base_url: String,
    /// Bearer token sent as `Authorization: Bearer <key>` when present.
    pub api_key: Option<String>,
    /// Extra headers appended to every request.
    pub headers: Vec<(String, String)>,
    /// Timeout for pull and push requests.
    pub timeout: Duration,
    /// Timeout for the health probe.
    pub health_timeout: Duration,
}

impl HttpTransportConfig {
    /// Creates a configuration with default timeouts (30 s / 5 s).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            headers: Vec::new(),
            timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the bearer token.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Appends an extra header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the health probe timeout.
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }
}

/// HTTP-based sync transport with JSON bodies.
pub struct HttpTransport<C> {
    config: HttpTransportConfig,
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport over the given client.
    pub fn new(config: HttpTransportConfig, client: C) -> Self {
        Self { config, client }
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(key) = &self.config.api_key {
            headers.push(("Authorization".to_string(), format!("Bearer {key}")));
        }
        headers.extend(self.config.headers.iter().cloned());
        headers
    }

    fn check_status(response: HttpResponse) -> SyncResult<Vec<u8>> {
        if response.is_success() {
            Ok(response.body)
        } else if response.status >= 500 {
            Err(SyncError::transport_retryable(format!(
                "server returned status {}",
                response.status
            )))
        } else {
            Err(SyncError::transport_fatal(format!(
                "server returned status {}",
                response.status
            )))
        }
    }
}

impl<T, C> SyncTransport<T> for HttpTransport<C>
where
    T: Serialize + DeserializeOwned + Send + Sync,
    C: HttpClient,
{
    fn push(&self, batch: &ChangeBatch<T>) -> SyncResult<PushResponse<T>> {
        let url = format!("{}/sync/push", self.config.base_url);
        let body = serde_json::to_vec(batch)?;

        let response = self
            .client
            .post(&url, &self.request_headers(), body, self.config.timeout)
            .map_err(SyncError::transport_retryable)?;

        let body = Self::check_status(response)?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn pull(&self, since: Timestamp) -> SyncResult<PullResponse<T>> {
        let url = format!("{}/sync/pull?since={}", self.config.base_url, since);

        let response = self
            .client
            .get(&url, &self.request_headers(), self.config.timeout)
            .map_err(SyncError::transport_retryable)?;

        let body = Self::check_status(response)?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn is_online(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);
        match self
            .client
            .get(&url, &self.request_headers(), self.config.health_timeout)
        {
            Ok(response) => response.is_success(),
            Err(_) => false,
        }
    }
}

/// Server side of the in-process loopback pair.
pub trait LoopbackServer: Send + Sync {
    /// Handles a GET request for a path with its query string.
    fn handle_get(&self, path_and_query: &str) -> Result<HttpResponse, String>;

    /// Handles a POST request.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<HttpResponse, String>;
}

/// An HTTP client that routes requests directly to a [`LoopbackServer`].
///
/// Useful for testing the full wire path without network overhead.
pub struct LoopbackClient<S> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    fn path_of(url: &str) -> &str {
        url.find("/sync/")
            .or_else(|| url.find("/health"))
            .map(|i| &url[i..])
            .unwrap_or(url)
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn get(
        &self,
        url: &str,
        _headers: &[(String, String)],
        _timeout: Duration,
    ) -> Result<HttpResponse, String> {
        self.server.handle_get(Self::path_of(url))
    }

    fn post(
        &self,
        url: &str,
        _headers: &[(String, String)],
        body: Vec<u8>,
        _timeout: Duration,
    ) -> Result<HttpResponse, String> {
        self.server.handle_post(Self::path_of(url), &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::Value;

    struct RecordingClient {
        response: Mutex<Result<HttpResponse, String>>,
        last_url: Mutex<Option<String>>,
        last_headers: Mutex<Vec<(String, String)>>,
    }

    impl RecordingClient {
        fn returning(response: Result<HttpResponse, String>) -> Self {
            Self {
                response: Mutex::new(response),
                last_url: Mutex::new(None),
                last_headers: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, String> {
            *self.last_url.lock() = Some(url.to_string());
            *self.last_headers.lock() = headers.to_vec();
            self.response.lock().clone()
        }
    }

    impl HttpClient for RecordingClient {
        fn get(
            &self,
            url: &str,
            headers: &[(String, String)],
            _timeout: Duration,
        ) -> Result<HttpResponse, String> {
            self.record(url, headers)
        }

        fn post(
            &self,
            url: &str,
            headers: &[(String, String)],
            _body: Vec<u8>,
            _timeout: Duration,
        ) -> Result<HttpResponse, String> {
            self.record(url, headers)
        }
    }

    fn pull_body() -> Vec<u8> {
        serde_json::to_vec(&PullResponse::<Value>::success(Vec::new(), 9)).unwrap()
    }

    #[test]
    fn pull_url_carries_the_cursor() {
        let client = RecordingClient::returning(Ok(HttpResponse::new(200, pull_body())));
        let transport = HttpTransport::new(
            HttpTransportConfig::new("https://sync.example.com"),
            client,
        );

        let response: PullResponse<Value> = transport.pull(1234).unwrap();
        assert_eq!(response.timestamp, 9);
        assert_eq!(
            transport.client.last_url.lock().as_deref(),
            Some("https://sync.example.com/sync/pull?since=1234")
        );
    }

    #[test]
    fn headers_include_json_and_bearer_token() {
        let client = RecordingClient::returning(Ok(HttpResponse::new(200, pull_body())));
        let transport = HttpTransport::new(
            HttpTransportConfig::new("https://sync.example.com")
                .with_api_key("secret")
                .with_header("X-Client", "docsync"),
            client,
        );

        let _: PullResponse<Value> = transport.pull(0).unwrap();
        let headers = transport.client.last_headers.lock().clone();
        assert!(headers.contains(&("Content-Type".into(), "application/json".into())));
        assert!(headers.contains(&("Authorization".into(), "Bearer secret".into())));
        assert!(headers.contains(&("X-Client".into(), "docsync".into())));
    }

    #[test]
    fn server_errors_are_retryable_client_errors_are_not() {
        let client = RecordingClient::returning(Ok(HttpResponse::new(503, Vec::new())));
        let transport = HttpTransport::new(HttpTransportConfig::new("http://s"), client);
        let err = SyncTransport::<Value>::pull(&transport, 0).unwrap_err();
        assert!(err.is_retryable());

        let client = RecordingClient::returning(Ok(HttpResponse::new(403, Vec::new())));
        let transport = HttpTransport::new(HttpTransportConfig::new("http://s"), client);
        let err = SyncTransport::<Value>::pull(&transport, 0).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn health_maps_status_to_online() {
        let client = RecordingClient::returning(Ok(HttpResponse::new(204, Vec::new())));
        let transport = HttpTransport::new(HttpTransportConfig::new("http://s"), client);
        assert!(SyncTransport::<Value>::is_online(&transport));
        assert_eq!(
            transport.client.last_url.lock().as_deref(),
            Some("http://s/health")
        );

        let client = RecordingClient::returning(Err("connection refused".into()));
        let transport = HttpTransport::new(HttpTransportConfig::new("http://s"), client);
        assert!(!SyncTransport::<Value>::is_online(&transport));
    }

    #[test]
    fn loopback_strips_the_base_url() {
        assert_eq!(
            LoopbackClient::<DummyServer>::path_of("http://host:8080/sync/pull?since=0"),
            "/sync/pull?since=0"
        );
        assert_eq!(
            LoopbackClient::<DummyServer>::path_of("https://host/health"),
            "/health"
        );
    }

    struct DummyServer;

    impl LoopbackServer for DummyServer {
        fn handle_get(&self, _path: &str) -> Result<HttpResponse, String> {
            Ok(HttpResponse::new(200, Vec::new()))
        }

        fn handle_post(&self, _path: &str, _body: &[u8]) -> Result<HttpResponse, String> {
            Ok(HttpResponse::new(200, Vec::new()))
        }
    }
}
