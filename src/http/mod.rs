use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;

use crate::error::ChatError;

/// Outbound request; both adapters only ever POST JSON.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Builds a POST request with a JSON request body.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::http::HttpRequest;
    ///
    /// let request = HttpRequest::post_json("https://example.com", br"{}".to_vec());
    /// assert_eq!(request.headers.get("Content-Type"), Some(&"application/json".to_string()));
    /// ```
    pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            headers: json_headers(),
            body,
            timeout: None,
        }
    }

    /// Adds headers on top of the ones already set, replacing duplicates.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use chatrelay::http::HttpRequest;
    ///
    /// let request = HttpRequest::post_json("https://example.com", br"{}".to_vec())
    ///     .with_headers(HashMap::from([("Authorization".into(), "Bearer test".into())]));
    /// assert_eq!(request.headers.get("Authorization"), Some(&"Bearer test".to_string()));
    /// assert_eq!(request.headers.get("Content-Type"), Some(&"application/json".to_string()));
    /// ```
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets a per-request timeout, overriding the transport default.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Minimal HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Converts the body into a UTF-8 string.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::http::HttpResponse;
    ///
    /// let response = HttpResponse { status: 200, body: b"ok".to_vec() };
    /// assert_eq!(response.into_string().unwrap(), "ok");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Transport`] when the body is not valid UTF-8.
    pub fn into_string(self) -> Result<String, ChatError> {
        String::from_utf8(self.body).map_err(|err| ChatError::transport(err.to_string()))
    }
}

/// HTTP response carrying a streaming body.
pub struct HttpStreamResponse {
    pub status: u16,
    pub body: HttpBodyStream,
}

/// Body stream returned by [`HttpTransport::send_stream`].
pub type HttpBodyStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ChatError>> + Send>>;

/// Decouples the adapters from the concrete HTTP client.
///
/// Every adapter call goes through exactly one `send` or `send_stream`, which makes
/// in-memory implementations a precise way to count round trips in tests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and resolves when the full response is available.
    ///
    /// # Examples
    ///
    /// ```
    /// # use async_trait::async_trait;
    /// # use chatrelay::http::{HttpTransport, HttpRequest, HttpResponse, HttpStreamResponse};
    /// # use chatrelay::error::ChatError;
    /// # use futures_util::stream;
    /// struct MemoryTransport;
    ///
    /// #[async_trait]
    /// impl HttpTransport for MemoryTransport {
    ///     async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, ChatError> {
    ///         Ok(HttpResponse { status: 200, body: b"ok".to_vec() })
    ///     }
    ///     async fn send_stream(&self, _request: HttpRequest) -> Result<HttpStreamResponse, ChatError> {
    ///         Ok(HttpStreamResponse { status: 200, body: Box::pin(stream::empty()) })
    ///     }
    /// }
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let response = MemoryTransport
    ///     .send(HttpRequest::post_json("https://example.com", br"{}".to_vec()))
    ///     .await
    ///     .unwrap();
    /// assert_eq!(response.status, 200);
    /// # });
    /// ```
    ///
    /// # Errors
    ///
    /// Implementations map network failures to [`ChatError::Transport`].
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ChatError>;

    /// Sends a request and returns the body as a stream of byte chunks.
    ///
    /// # Errors
    ///
    /// Implementations map network failures to [`ChatError::Transport`].
    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, ChatError>;
}

/// Thread-safe handle to a transport implementation.
pub type DynHttpTransport = Arc<dyn HttpTransport>;

fn json_headers() -> HashMap<String, String> {
    HashMap::from([("Content-Type".to_string(), "application/json".to_string())])
}

fn encode_json<T: Serialize>(body: &T) -> Result<Vec<u8>, ChatError> {
    // A body that cannot be encoded never leaves the process.
    serde_json::to_vec(body)
        .map_err(|err| ChatError::transport(format!("failed to serialize request: {err}")))
}

/// Serializes a body to JSON, attaches headers, and issues a POST request.
///
/// # Errors
///
/// Returns [`ChatError::Transport`] if serialization fails or forwards the error
/// raised by [`HttpTransport::send`].
pub async fn post_json_with_headers<T: Serialize>(
    transport: &dyn HttpTransport,
    url: impl Into<String>,
    headers: HashMap<String, String>,
    body: &T,
    timeout: Option<Duration>,
) -> Result<HttpResponse, ChatError> {
    let payload = encode_json(body)?;
    let request = HttpRequest::post_json(url, payload)
        .with_headers(headers)
        .with_timeout(timeout);
    transport.send(request).await
}

/// Streaming counterpart of [`post_json_with_headers`].
///
/// # Errors
///
/// Returns [`ChatError::Transport`] when serialization fails or propagates any
/// error from [`HttpTransport::send_stream`].
pub async fn post_json_stream_with_headers<T: Serialize>(
    transport: &dyn HttpTransport,
    url: impl Into<String>,
    headers: HashMap<String, String>,
    body: &T,
    timeout: Option<Duration>,
) -> Result<HttpStreamResponse, ChatError> {
    let payload = encode_json(body)?;
    let request = HttpRequest::post_json(url, payload)
        .with_headers(headers)
        .with_timeout(timeout);
    transport.send_stream(request).await
}

pub mod reqwest;
