//! Normalized error type returned by every failed request.
//!
//! Whatever goes wrong below the client (a non-2xx response, a dropped
//! connection, a timeout) reaches the caller as an [`ApiError`] carrying a
//! stable machine-readable [`ErrorCode`]. Construction lives in [`classify`].

mod classify;

pub use classify::{classify_invalid_body, classify_response, classify_transport, code_for_status};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Stable error codes exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
  NetworkError,
  TimeoutError,
  ServerError,
  ValidationError,
  NotFound,
  Unauthorized,
  Forbidden,
  BadRequest,
  InvalidParams,
  UnknownError,
  /// A code supplied verbatim by the API in the response body
  Custom(String),
}

impl ErrorCode {
  pub fn as_str(&self) -> &str {
    match self {
      Self::NetworkError => "network_error",
      Self::TimeoutError => "timeout_error",
      Self::ServerError => "server_error",
      Self::ValidationError => "validation_error",
      Self::NotFound => "not_found",
      Self::Unauthorized => "unauthorized",
      Self::Forbidden => "forbidden",
      Self::BadRequest => "bad_request",
      Self::InvalidParams => "invalid_params",
      Self::UnknownError => "unknown_error",
      Self::Custom(code) => code,
    }
  }

  /// Parse a code string, keeping unknown values as [`ErrorCode::Custom`].
  pub fn parse(code: &str) -> Self {
    match code {
      "network_error" => Self::NetworkError,
      "timeout_error" => Self::TimeoutError,
      "server_error" => Self::ServerError,
      "validation_error" => Self::ValidationError,
      "not_found" => Self::NotFound,
      "unauthorized" => Self::Unauthorized,
      "forbidden" => Self::Forbidden,
      "bad_request" => Self::BadRequest,
      "invalid_params" => Self::InvalidParams,
      "unknown_error" => Self::UnknownError,
      other => Self::Custom(other.to_string()),
    }
  }

  /// Whether this code describes a failure below HTTP (no response at all).
  pub fn is_transport(&self) -> bool {
    matches!(self, Self::NetworkError | Self::TimeoutError)
  }
}

impl fmt::Display for ErrorCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl Serialize for ErrorCode {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

impl<'de> Deserialize<'de> for ErrorCode {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let code = String::deserialize(deserializer)?;
    Ok(Self::parse(&code))
  }
}

/// A classified request failure.
///
/// Immutable once built; the retry executor hands the same value back to the
/// caller when it gives up.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code} on {endpoint}: {message}")]
pub struct ApiError {
  pub message: String,
  pub status: Option<u16>,
  pub code: ErrorCode,
  pub endpoint: String,
  pub timestamp: DateTime<Utc>,
  /// Extra structured detail from the response body, if any
  pub data: Option<Value>,
}

impl ApiError {
  pub fn new(code: ErrorCode, message: impl Into<String>, endpoint: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      status: None,
      code,
      endpoint: endpoint.into(),
      timestamp: Utc::now(),
      data: None,
    }
  }

  pub fn with_status(mut self, status: u16) -> Self {
    self.status = Some(status);
    self
  }

  pub fn with_data(mut self, data: Value) -> Self {
    self.data = Some(data);
    self
  }

  /// Short, non-technical sentence suitable for showing to an end user.
  ///
  /// Client errors that have no dedicated wording (400, 422, API-specific
  /// codes) fall back to the message the API sent, since that is usually the
  /// most specific thing we can show.
  pub fn user_message(&self) -> String {
    if let Some(status) = self.status {
      match status {
        s if s >= 500 => return "The server encountered an error. Please try again later.".to_string(),
        401 => return "Your session has expired. Please sign in again.".to_string(),
        403 => return "You do not have permission to perform this action.".to_string(),
        404 => return "The requested item could not be found.".to_string(),
        408 => return "The server took too long to respond. Please try again.".to_string(),
        429 => return "Too many requests. Please wait a moment and try again.".to_string(),
        _ => {}
      }
    }

    match self.code {
      ErrorCode::NetworkError => {
        "Unable to reach the server. Please check your internet connection.".to_string()
      }
      ErrorCode::TimeoutError => {
        "The request took too long to complete. Please try again.".to_string()
      }
      ErrorCode::ServerError => {
        "The server encountered an error. Please try again later.".to_string()
      }
      _ if self.message.trim().is_empty() => {
        "Something went wrong. Please try again.".to_string()
      }
      _ => self.message.clone(),
    }
  }

  /// Serialized form handed across the API boundary.
  ///
  /// `details` is only included in debug builds.
  pub fn to_envelope(&self) -> Value {
    let mut envelope = json!({
      "message": self.message,
      "code": self.code,
      "status": self.status,
      "isApiError": true,
      "timestamp": self.timestamp.to_rfc3339(),
    });

    if cfg!(debug_assertions) {
      if let (Some(data), Some(obj)) = (&self.data, envelope.as_object_mut()) {
        obj.insert("details".to_string(), data.clone());
      }
    }

    envelope
  }
}
