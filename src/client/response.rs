use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::transport::HttpResponse;
use crate::cache::CacheEntry;
use crate::error::{classify_invalid_body, ApiError, ErrorCode};

/// Result of a successful request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
  /// Parsed body: JSON, a string for non-JSON bodies, or null when empty
  pub data: Value,
  /// Whether the body was served from the cache without a network call
  pub cached: bool,
  pub endpoint: String,
}

impl ApiResponse {
  pub fn from_network(endpoint: &str, data: Value) -> Self {
    Self {
      data,
      cached: false,
      endpoint: endpoint.to_string(),
    }
  }

  pub fn from_cache(endpoint: &str, entry: &CacheEntry) -> Self {
    Self {
      data: (*entry.value).clone(),
      cached: true,
      endpoint: endpoint.to_string(),
    }
  }

  /// Deserialize the body into `T`.
  pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
    serde_json::from_value(self.data.clone()).map_err(|e| {
      ApiError::new(
        ErrorCode::UnknownError,
        format!("unexpected response shape: {}", e),
        self.endpoint.clone(),
      )
    })
  }

  /// The body with a `cached` flag merged in.
  ///
  /// Object bodies get the flag as an extra field; anything else is wrapped
  /// as `{"data": ..., "cached": ...}`.
  pub fn into_merged(self) -> Value {
    match self.data {
      Value::Object(mut map) => {
        map.insert("cached".to_string(), Value::Bool(self.cached));
        Value::Object(map)
      }
      other => {
        let mut map = Map::new();
        map.insert("data".to_string(), other);
        map.insert("cached".to_string(), Value::Bool(self.cached));
        Value::Object(map)
      }
    }
  }
}

/// Decode a 2xx response body by its content type.
pub(crate) fn parse_body(response: &HttpResponse, endpoint: &str) -> Result<Value, ApiError> {
  if response.body.iter().all(u8::is_ascii_whitespace) {
    return Ok(Value::Null);
  }
  if response.is_json() {
    return serde_json::from_slice(&response.body)
      .map_err(|e| classify_invalid_body(response.status, &e.to_string(), endpoint));
  }
  Ok(Value::String(
    String::from_utf8_lossy(&response.body).into_owned(),
  ))
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
  use serde::Deserialize;
  use serde_json::json;

  fn response(content_type: &str, body: &[u8]) -> HttpResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
    HttpResponse {
      status: 200,
      headers,
      body: body.to_vec(),
    }
  }

  #[test]
  fn test_parse_json_body() {
    let value = parse_body(&response("application/json", br#"{"id": 1}"#), "items").unwrap();
    assert_eq!(value, json!({"id": 1}));
  }

  #[test]
  fn test_parse_text_body() {
    let value = parse_body(&response("text/plain", b"pong"), "ping").unwrap();
    assert_eq!(value, json!("pong"));
  }

  #[test]
  fn test_parse_empty_body() {
    let value = parse_body(&response("application/json", b""), "items/1").unwrap();
    assert_eq!(value, Value::Null);
  }

  #[test]
  fn test_parse_invalid_json() {
    let err = parse_body(&response("application/json", b"{oops"), "items").unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownError);
    assert_eq!(err.status, Some(200));
    assert_eq!(err.endpoint, "items");
  }

  #[test]
  fn test_merge_cached_flag() {
    let merged = ApiResponse::from_network("items", json!({"items": []})).into_merged();
    assert_eq!(merged, json!({"items": [], "cached": false}));

    let merged = ApiResponse {
      data: json!([1, 2]),
      cached: true,
      endpoint: "items".to_string(),
    }
    .into_merged();
    assert_eq!(merged, json!({"data": [1, 2], "cached": true}));
  }

  #[test]
  fn test_typed_json() {
    #[derive(Debug, Deserialize)]
    struct Teacher {
      name: String,
    }

    let response = ApiResponse::from_network("teachers/1", json!({"name": "Ajahn Chah"}));
    let teacher: Teacher = response.json().unwrap();
    assert_eq!(teacher.name, "Ajahn Chah");

    let bad: Result<Vec<Teacher>, _> = response.json();
    assert_eq!(bad.unwrap_err().endpoint, "teachers/1");
  }
}
