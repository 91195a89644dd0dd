//! HTTP transport boundary.
//!
//! The client only needs "send this request, give me status, headers and
//! bytes". Tests implement [`Transport`] to script responses without a
//! socket.

use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, Method};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Connect timeout for the default reqwest client. The per-request timeout
/// is applied by the client around every attempt.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// A fully built request, ready to hand to a [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: Method,
  pub url: Url,
  pub headers: HeaderMap,
  pub body: Option<Vec<u8>>,
}

/// Raw response as returned by the transport.
#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  pub headers: HeaderMap,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn content_type(&self) -> Option<&str> {
    self.headers.get(CONTENT_TYPE)?.to_str().ok()
  }

  /// Whether the body should be parsed as JSON.
  pub fn is_json(&self) -> bool {
    self
      .content_type()
      .map(|ct| {
        let ct = ct.to_ascii_lowercase();
        ct.contains("application/json") || ct.contains("+json")
      })
      .unwrap_or(false)
  }
}

/// What kind of failure happened below HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
  /// The attempt ran out of time
  Timeout,
  /// The attempt was cancelled before completing
  Cancelled,
  /// Could not connect (DNS, refused, reset, TLS handshake)
  Connect,
  /// Anything else the transport reported
  Other,
}

/// Failure reported by a [`Transport`] when no HTTP response was produced.
#[derive(Debug, Clone)]
pub struct TransportError {
  pub kind: TransportErrorKind,
  pub message: String,
}

impl TransportError {
  pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }

  pub fn timeout(after: Duration) -> Self {
    Self::new(
      TransportErrorKind::Timeout,
      format!("request timed out after {}ms", after.as_millis()),
    )
  }

  pub fn connect(message: impl Into<String>) -> Self {
    Self::new(TransportErrorKind::Connect, message)
  }
}

impl fmt::Display for TransportError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.message)
  }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
  fn from(e: reqwest::Error) -> Self {
    // A connection that is accepted and then dropped surfaces as a request
    // or body error without the connect flag.
    let kind = if e.is_timeout() {
      TransportErrorKind::Timeout
    } else if e.is_connect() || e.is_request() || e.is_body() {
      TransportErrorKind::Connect
    } else {
      TransportErrorKind::Other
    };
    Self::new(kind, e.to_string())
  }
}

/// Something that can execute an [`HttpRequest`].
///
/// Dropping the returned future must abort the request; the client relies on
/// that for timeouts.
pub trait Transport: Send + Sync {
  fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
  fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
    (**self).send(request)
  }
}

/// Default transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: Client,
}

impl ReqwestTransport {
  pub fn new() -> Result<Self, TransportError> {
    let client = Client::builder()
      .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
      .build()
      .map_err(|e| TransportError::new(TransportErrorKind::Other, e.to_string()))?;
    Ok(Self { client })
  }

  /// Wrap an already configured reqwest client.
  pub fn with_client(client: Client) -> Self {
    Self { client }
  }
}

impl Transport for ReqwestTransport {
  fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
    Box::pin(async move {
      let mut builder = self
        .client
        .request(request.method, request.url)
        .headers(request.headers);
      if let Some(body) = request.body {
        builder = builder.body(body);
      }

      let response = builder.send().await?;
      let status = response.status().as_u16();
      let headers = response.headers().clone();
      let body = response
        .bytes()
        .await
        .map_err(|e| TransportError::connect(format!("failed to read response body: {}", e)))?
        .to_vec();

      Ok(HttpResponse {
        status,
        headers,
        body,
      })
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::header::HeaderValue;

  fn response_with_type(content_type: &str) -> HttpResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
    HttpResponse {
      status: 200,
      headers,
      body: Vec::new(),
    }
  }

  #[test]
  fn test_is_json_content_types() {
    assert!(response_with_type("application/json").is_json());
    assert!(response_with_type("application/json; charset=utf-8").is_json());
    assert!(response_with_type("application/problem+json").is_json());
    assert!(!response_with_type("text/html").is_json());
  }

  #[test]
  fn test_is_success_range() {
    let mut response = response_with_type("text/plain");
    assert!(response.is_success());
    response.status = 204;
    assert!(response.is_success());
    response.status = 302;
    assert!(!response.is_success());
    response.status = 404;
    assert!(!response.is_success());
  }

  #[test]
  fn test_timeout_error_message() {
    let err = TransportError::timeout(Duration::from_millis(1500));
    assert_eq!(err.kind, TransportErrorKind::Timeout);
    assert_eq!(err.to_string(), "request timed out after 1500ms");
  }
}
