use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;

/// Statuses retried by default. Anything `>= 500` is retried as well.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Custom retry predicate, consulted instead of the default rules.
pub type ShouldRetryFn = Arc<dyn Fn(&ApiError) -> bool + Send + Sync>;

/// Exponential backoff policy for one logical request.
#[derive(Clone)]
pub struct RetryPolicy {
  /// Retries after the first attempt. Total attempts are `max_retries + 1`.
  pub max_retries: u32,
  /// Delay before the first retry; doubles on every further retry.
  pub base_delay: Duration,
  /// Upper bound on any single delay.
  pub max_delay: Duration,
  /// Spread each delay by a random factor in `[0.75, 1.25]`.
  pub jitter: bool,
  pub retryable_statuses: BTreeSet<u16>,
  pub should_retry: Option<ShouldRetryFn>,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay: Duration::from_millis(1000),
      max_delay: Duration::from_millis(30_000),
      jitter: true,
      retryable_statuses: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
      should_retry: None,
    }
  }
}

impl RetryPolicy {
  pub fn with_max_retries(mut self, max_retries: u32) -> Self {
    self.max_retries = max_retries;
    self
  }

  pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
    self.base_delay = base_delay;
    self
  }

  pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
    self.max_delay = max_delay;
    self
  }

  pub fn with_jitter(mut self, jitter: bool) -> Self {
    self.jitter = jitter;
    self
  }

  /// Replace the default retry rules with a custom predicate.
  pub fn with_should_retry<F>(mut self, predicate: F) -> Self
  where
    F: Fn(&ApiError) -> bool + Send + Sync + 'static,
  {
    self.should_retry = Some(Arc::new(predicate));
    self
  }

  /// Whether `error` is worth another attempt under this policy.
  ///
  /// Does not look at the attempt count; the executor checks that first.
  pub fn should_retry(&self, error: &ApiError) -> bool {
    match &self.should_retry {
      Some(predicate) => predicate(error),
      None => self.is_transient(error),
    }
  }

  /// Default rule: retryable statuses, any 5xx, or a timeout/network failure
  /// that never produced a response. Other 4xx are the caller's fault.
  pub fn is_transient(&self, error: &ApiError) -> bool {
    match error.status {
      Some(status) => self.retryable_statuses.contains(&status) || status >= 500,
      None => error.code.is_transport(),
    }
  }
}

impl fmt::Debug for RetryPolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RetryPolicy")
      .field("max_retries", &self.max_retries)
      .field("base_delay", &self.base_delay)
      .field("max_delay", &self.max_delay)
      .field("jitter", &self.jitter)
      .field("retryable_statuses", &self.retryable_statuses)
      .field("should_retry", &self.should_retry.as_ref().map(|_| "custom"))
      .finish()
  }
}

/// Retry behaviour for a request: a policy, or explicitly none.
#[derive(Debug, Clone)]
pub enum Retry {
  Policy(RetryPolicy),
  Disabled,
}

impl Default for Retry {
  fn default() -> Self {
    Retry::Policy(RetryPolicy::default())
  }
}

impl From<RetryPolicy> for Retry {
  fn from(policy: RetryPolicy) -> Self {
    Retry::Policy(policy)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorCode;

  fn http_error(status: u16) -> ApiError {
    ApiError::new(crate::error::code_for_status(status), "failed", "items").with_status(status)
  }

  #[test]
  fn test_retries_transient_statuses() {
    let policy = RetryPolicy::default();
    for status in [408, 429, 500, 502, 503, 504, 507] {
      assert!(policy.should_retry(&http_error(status)), "status {}", status);
    }
  }

  #[test]
  fn test_never_retries_client_errors() {
    let policy = RetryPolicy::default();
    for status in [400, 401, 403, 404, 409, 422] {
      assert!(!policy.should_retry(&http_error(status)), "status {}", status);
    }
  }

  #[test]
  fn test_transport_failures_without_status() {
    let policy = RetryPolicy::default();
    assert!(policy.should_retry(&ApiError::new(ErrorCode::TimeoutError, "t", "items")));
    assert!(policy.should_retry(&ApiError::new(ErrorCode::NetworkError, "n", "items")));
    assert!(!policy.should_retry(&ApiError::new(ErrorCode::UnknownError, "u", "items")));
  }

  #[test]
  fn test_custom_predicate_replaces_defaults() {
    let policy = RetryPolicy::default().with_should_retry(|e| e.status == Some(404));
    assert!(policy.should_retry(&http_error(404)));
    assert!(!policy.should_retry(&http_error(503)));
  }

  #[test]
  fn test_default_is_enabled_policy() {
    match Retry::default() {
      Retry::Policy(policy) => {
        assert_eq!(policy.max_retries, 3);
        assert!(policy.jitter);
        assert!(policy.retryable_statuses.contains(&429));
      }
      Retry::Disabled => panic!("expected a policy"),
    }
  }
}
