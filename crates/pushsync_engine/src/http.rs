//! HTTP transport implementation.
//!
//! This module turns request descriptors into HTTP calls. The actual HTTP
//! client is abstracted via a trait to allow different implementations
//! (reqwest, hyper, ureq, or an in-process loopback for tests).

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use pushsync_protocol::{HttpMethod, Parameters, RequestDescriptor};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// One outgoing HTTP call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL without the query string.
    pub url: String,
    /// Query parameters.
    pub query: Parameters,
    /// Header name and value pairs.
    pub headers: Vec<(String, String)>,
    /// Encoded JSON body.
    pub body: Option<Vec<u8>>,
    /// Time the client may spend on the call.
    pub timeout: Duration,
}

impl HttpRequest {
    /// Returns the first header named `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the path part of the URL.
    pub fn path(&self) -> &str {
        let without_scheme = self
            .url
            .split_once("://")
            .map_or(self.url.as_str(), |(_, rest)| rest);
        without_scheme
            .find('/')
            .map_or("/", |i| &without_scheme[i..])
    }
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failures below the HTTP status level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpClientError {
    /// The request never got a response.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The response did not arrive in time.
    #[error("request timed out")]
    Timeout,
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP stack.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns whatever status the server answered.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError>;
}

/// Executes request descriptors over an [`HttpClient`].
///
/// Each call to [`HttpTransport::execute`] is exactly one HTTP request;
/// retrying is the caller's business.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the API (e.g., "https://push.example.com").
    base_url: String,
    /// Sent in the authorization header.
    application_code: String,
    /// Per-request timeout.
    timeout: Duration,
    /// HTTP client implementation.
    client: C,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(
        base_url: impl Into<String>,
        application_code: impl Into<String>,
        client: C,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            application_code: application_code.into(),
            timeout: Duration::from_secs(30),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the wrapped client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Builds the HTTP request for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Protocol`] if the body cannot be encoded.
    pub fn build_request<D: RequestDescriptor>(&self, descriptor: &D) -> SyncResult<HttpRequest> {
        let body = descriptor
            .body()
            .map(|value| serde_json::to_vec(&value))
            .transpose()
            .map_err(|e| SyncError::Protocol(format!("cannot encode request body: {e}")))?;

        let mut headers = vec![(
            "Authorization".to_string(),
            format!("App {}", self.application_code),
        )];
        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        Ok(HttpRequest {
            method: descriptor.method(),
            url: format!("{}{}", self.base_url, descriptor.path().as_str()),
            query: descriptor.parameters(),
            headers,
            body,
            timeout: self.timeout,
        })
    }

    /// Performs one call for `descriptor` and decodes the response.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Transport`] (retryable) when no response arrived
    /// - [`SyncError::Timeout`] when the client gave up waiting
    /// - [`SyncError::Server`] for non-2xx statuses
    /// - [`SyncError::Decoding`] when the body does not match `D::Response`
    pub fn execute<D: RequestDescriptor>(&self, descriptor: &D) -> SyncResult<D::Response> {
        let request = self.build_request(descriptor)?;
        debug!(
            request = descriptor.name(),
            method = request.method.as_str(),
            path = descriptor.path().as_str(),
            "sending request"
        );

        let response = self.client.send(request).map_err(|e| {
            self.set_error(&e.to_string());
            match e {
                HttpClientError::Connect(message) => SyncError::transport_retryable(message),
                HttpClientError::Timeout => SyncError::Timeout,
            }
        })?;

        if !response.is_success() {
            let message = String::from_utf8_lossy(&response.body).into_owned();
            self.set_error(&format!("{} {}", response.status, message));
            return Err(SyncError::Server {
                status: response.status,
                message,
            });
        }

        self.clear_error();

        // Some endpoints answer with an empty body
        let body: &[u8] = if response.body.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &response.body
        };
        serde_json::from_slice(body)
            .map_err(|e| SyncError::Decoding(format!("{} response: {e}", descriptor.name())))
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a request and returns the response.
    fn handle(&self, request: &HttpRequest) -> HttpResponse;
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError> {
        Ok(self.server.handle(&request))
    }
}
