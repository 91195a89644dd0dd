use serde_json::{Map, Value};
use std::time::Duration;

use crate::retry::Retry;

/// Whether credential headers (`authorization`, `cookie`) are sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Credentials {
  /// Never send them
  Omit,
  /// Send them only to the client's own origin
  #[default]
  SameOrigin,
  /// Always send them
  Include,
}

/// Per-call request options.
///
/// Everything left at its default falls back to the client's settings.
#[derive(Debug, Clone)]
pub struct RequestOptions {
  /// Serve and store GET responses through the cache
  pub cache: bool,
  /// Per-attempt timeout; `None` uses the client default
  pub timeout: Option<Duration>,
  /// Retry behaviour; `None` uses the client default
  pub retry: Option<Retry>,
  /// Extra headers; these win over the client's default headers
  pub headers: Vec<(String, String)>,
  pub credentials: Credentials,
  /// After a successful write, drop cached reads of the written resource
  pub invalidate_cache: bool,
  /// Query/filter parameters. Must be a JSON object or null.
  pub params: Value,
}

impl Default for RequestOptions {
  fn default() -> Self {
    Self {
      cache: true,
      timeout: None,
      retry: None,
      headers: Vec::new(),
      credentials: Credentials::default(),
      invalidate_cache: false,
      params: Value::Null,
    }
  }
}

impl RequestOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a single query parameter.
  pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    if !self.params.is_object() {
      self.params = Value::Object(Map::new());
    }
    if let Value::Object(map) = &mut self.params {
      map.insert(key.into(), value.into());
    }
    self
  }

  /// Replace all query parameters.
  pub fn with_params(mut self, params: Value) -> Self {
    self.params = params;
    self
  }

  pub fn no_cache(mut self) -> Self {
    self.cache = false;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn with_retry(mut self, retry: impl Into<Retry>) -> Self {
    self.retry = Some(retry.into());
    self
  }

  pub fn no_retry(mut self) -> Self {
    self.retry = Some(Retry::Disabled);
    self
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn with_credentials(mut self, credentials: Credentials) -> Self {
    self.credentials = credentials;
    self
  }

  pub fn invalidate_cache(mut self) -> Self {
    self.invalidate_cache = true;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_defaults() {
    let options = RequestOptions::default();
    assert!(options.cache);
    assert!(!options.invalidate_cache);
    assert!(options.timeout.is_none());
    assert!(options.retry.is_none());
    assert_eq!(options.credentials, Credentials::SameOrigin);
    assert!(options.params.is_null());
  }

  #[test]
  fn test_param_builds_object() {
    let options = RequestOptions::new()
      .param("tradition", "zen")
      .param("page", 2);
    assert_eq!(options.params, json!({"tradition": "zen", "page": 2}));
  }

  #[test]
  fn test_no_retry_is_disabled_variant() {
    let options = RequestOptions::new().no_retry();
    assert!(matches!(options.retry, Some(Retry::Disabled)));
  }
}
