//! Turn raw failures into [`ApiError`]s.
//!
//! These functions are total: any input, including garbage bodies and odd
//! status codes, produces an error value. They do not log.

use serde_json::Value;

use super::{ApiError, ErrorCode};
use crate::client::transport::{HttpResponse, TransportError, TransportErrorKind};

/// Longest plain-text body we are willing to use as an error message.
const MAX_TEXT_MESSAGE_LEN: usize = 500;

/// Map an HTTP status to an error code using the fixed status table.
pub fn code_for_status(status: u16) -> ErrorCode {
  match status {
    s if s >= 500 => ErrorCode::ServerError,
    404 => ErrorCode::NotFound,
    401 => ErrorCode::Unauthorized,
    403 => ErrorCode::Forbidden,
    422 => ErrorCode::ValidationError,
    400 => ErrorCode::BadRequest,
    _ => ErrorCode::UnknownError,
  }
}

/// Classify a completed, non-2xx HTTP response.
///
/// A `code` in a JSON body wins over the status table.
pub fn classify_response(response: &HttpResponse, endpoint: &str) -> ApiError {
  let status = response.status;
  let body: Option<Value> = serde_json::from_slice(&response.body).ok();
  let fields = body.as_ref().and_then(Value::as_object);

  let body_code = fields
    .and_then(|obj| obj.get("code"))
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|code| !code.is_empty())
    .map(ErrorCode::parse);
  let code = body_code.unwrap_or_else(|| code_for_status(status));

  let message = fields
    .and_then(|obj| {
      obj
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| obj.get("error").and_then(Value::as_str))
    })
    .map(str::to_string)
    .or_else(|| text_message(response))
    .unwrap_or_else(|| status_message(status));

  let data = fields.and_then(|obj| {
    obj
      .get("details")
      .or_else(|| obj.get("errors"))
      .cloned()
  });

  let mut error = ApiError::new(code, message, endpoint).with_status(status);
  if let Some(data) = data {
    error = error.with_data(data);
  }
  error
}

/// Classify a failure that produced no HTTP response.
pub fn classify_transport(err: &TransportError, endpoint: &str) -> ApiError {
  let code = match err.kind {
    TransportErrorKind::Timeout | TransportErrorKind::Cancelled => ErrorCode::TimeoutError,
    TransportErrorKind::Connect => ErrorCode::NetworkError,
    TransportErrorKind::Other => ErrorCode::UnknownError,
  };
  ApiError::new(code, err.message.clone(), endpoint)
}

/// Classify a 2xx response whose body could not be decoded.
pub fn classify_invalid_body(status: u16, reason: &str, endpoint: &str) -> ApiError {
  ApiError::new(
    ErrorCode::UnknownError,
    format!("invalid response body: {}", reason),
    endpoint,
  )
  .with_status(status)
}

fn text_message(response: &HttpResponse) -> Option<String> {
  if response.is_json() {
    return None;
  }
  let text = std::str::from_utf8(&response.body).ok()?.trim();
  if text.is_empty() || text.len() > MAX_TEXT_MESSAGE_LEN {
    return None;
  }
  Some(text.to_string())
}

fn status_message(status: u16) -> String {
  match reqwest::StatusCode::from_u16(status)
    .ok()
    .and_then(|s| s.canonical_reason())
  {
    Some(reason) => format!("HTTP {} {}", status, reason),
    None => format!("HTTP {}", status),
  }
}
