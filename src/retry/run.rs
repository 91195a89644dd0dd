//! Retry loop: run an async operation until it succeeds or the policy says stop.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::backoff::compute_delay;
use super::policy::Retry;
use crate::error::ApiError;

/// One retry transition, reported before the executor sleeps.
#[derive(Debug, Clone)]
pub struct RetryEvent {
  /// Endpoint of the logical request being retried
  pub endpoint: String,
  /// Retry number, 1-based (1 = the second attempt is about to start)
  pub attempt: u32,
  pub max_retries: u32,
  pub delay: Duration,
  /// The failure that triggered this retry
  pub error: ApiError,
}

impl RetryEvent {
  /// One-line human readable description of the retry.
  pub fn format_retry(&self) -> String {
    format!(
      "Retrying {} (retry {}/{}) after {} - waiting {:.1} seconds...",
      self.endpoint,
      self.attempt,
      self.max_retries,
      self.error.code,
      self.delay.as_secs_f64()
    )
  }
}

/// Receives retry notifications. Purely observational; it cannot change the
/// outcome of the loop.
pub trait RetryObserver: Send + Sync {
  fn on_retry(&self, event: &RetryEvent);
}

/// Default observer: emits a `warn` event per retry.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
  fn on_retry(&self, event: &RetryEvent) {
    warn!(
      endpoint = %event.endpoint,
      attempt = event.attempt,
      max_retries = event.max_retries,
      delay_ms = event.delay.as_millis() as u64,
      code = %event.error.code,
      status = ?event.error.status,
      error = %event.error.message,
      "{}",
      event.format_retry()
    );
  }
}

/// Run `operation` under `retry`, logging retries through [`TracingObserver`].
pub async fn execute_with_retry<T, F, Fut>(
  retry: &Retry,
  endpoint: &str,
  operation: F,
) -> Result<T, ApiError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, ApiError>>,
{
  execute_with_retry_observed(retry, &TracingObserver, endpoint, operation).await
}

/// Run `operation` under `retry`, reporting every retry to `observer`.
///
/// The operation is invoked at most `max_retries + 1` times. The error from
/// the last attempt is returned unchanged once the policy gives up.
pub async fn execute_with_retry_observed<T, F, Fut>(
  retry: &Retry,
  observer: &dyn RetryObserver,
  endpoint: &str,
  mut operation: F,
) -> Result<T, ApiError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, ApiError>>,
{
  let policy = match retry {
    Retry::Disabled => return operation().await,
    Retry::Policy(policy) => policy,
  };

  let mut attempt = 0u32;
  loop {
    match operation().await {
      Ok(value) => {
        if attempt > 0 {
          debug!("Request to {} succeeded after {} retries", endpoint, attempt);
        }
        return Ok(value);
      }
      Err(error) => {
        if attempt >= policy.max_retries || !policy.should_retry(&error) {
          return Err(error);
        }

        let delay = compute_delay(attempt, policy);
        attempt += 1;
        observer.on_retry(&RetryEvent {
          endpoint: endpoint.to_string(),
          attempt,
          max_retries: policy.max_retries,
          delay,
          error,
        });
        tokio::time::sleep(delay).await;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::{code_for_status, ErrorCode};
  use crate::retry::RetryPolicy;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::{Arc, Mutex};

  #[derive(Default)]
  struct RecordingObserver {
    events: Mutex<Vec<RetryEvent>>,
  }

  impl RetryObserver for RecordingObserver {
    fn on_retry(&self, event: &RetryEvent) {
      self.events.lock().unwrap().push(event.clone());
    }
  }

  fn http_error(status: u16) -> ApiError {
    ApiError::new(code_for_status(status), "failed", "items").with_status(status)
  }

  fn policy(max_retries: u32) -> Retry {
    RetryPolicy::default()
      .with_max_retries(max_retries)
      .with_base_delay(Duration::from_millis(100))
      .with_max_delay(Duration::from_secs(10))
      .with_jitter(false)
      .into()
  }

  #[tokio::test(start_paused = true)]
  async fn test_success_on_first_attempt() {
    let calls = Arc::new(AtomicU32::new(0));
    let observer = RecordingObserver::default();

    let result = execute_with_retry_observed(&policy(5), &observer, "items", || {
      let calls = calls.clone();
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, ApiError>(7)
      }
    })
    .await;

    assert_eq!(result.unwrap(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(observer.events.lock().unwrap().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_gives_up_after_max_retries() {
    for max_retries in [0, 1, 3] {
      let calls = Arc::new(AtomicU32::new(0));
      let observer = RecordingObserver::default();

      let result: Result<(), ApiError> =
        execute_with_retry_observed(&policy(max_retries), &observer, "items", || {
          let calls = calls.clone();
          async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(http_error(503))
          }
        })
        .await;

      let err = result.unwrap_err();
      assert_eq!(err.status, Some(503));
      assert_eq!(calls.load(Ordering::SeqCst), max_retries + 1);
      assert_eq!(observer.events.lock().unwrap().len(), max_retries as usize);
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_not_found_is_never_retried() {
    let calls = Arc::new(AtomicU32::new(0));

    let result: Result<(), ApiError> = execute_with_retry(&policy(10), "items", || {
      let calls = calls.clone();
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(http_error(404))
      }
    })
    .await;

    assert_eq!(result.unwrap_err().code, ErrorCode::NotFound);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_recovers_and_reports_increasing_delays() {
    let calls = Arc::new(AtomicU32::new(0));
    let observer = RecordingObserver::default();
    let started = tokio::time::Instant::now();

    let result = execute_with_retry_observed(&policy(5), &observer, "items", || {
      let calls = calls.clone();
      async move {
        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
          Err(http_error(503))
        } else {
          Ok("done")
        }
      }
    })
    .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let events = observer.events.lock().unwrap();
    let delays: Vec<_> = events.iter().map(|e| e.delay).collect();
    assert_eq!(
      delays,
      vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
    assert_eq!(events[0].attempt, 1);
    assert_eq!(events[0].endpoint, "items");
    assert_eq!(events[1].attempt, 2);
    assert!(started.elapsed() >= Duration::from_millis(300));
  }

  #[tokio::test(start_paused = true)]
  async fn test_disabled_runs_once() {
    let calls = Arc::new(AtomicU32::new(0));

    let result: Result<(), ApiError> = execute_with_retry(&Retry::Disabled, "items", || {
      let calls = calls.clone();
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(http_error(503))
      }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_error_is_returned_unchanged() {
    let original = ApiError::new(ErrorCode::NetworkError, "connection reset", "teachers");
    let expected_timestamp = original.timestamp;

    let result: Result<(), ApiError> = execute_with_retry(&policy(2), "teachers", || {
      let err = original.clone();
      async move { Err(err) }
    })
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.code, ErrorCode::NetworkError);
    assert_eq!(err.message, "connection reset");
    assert_eq!(err.timestamp, expected_timestamp);
  }

  #[test]
  fn test_format_retry() {
    let event = RetryEvent {
      endpoint: "teachers/7".to_string(),
      attempt: 2,
      max_retries: 3,
      delay: Duration::from_millis(1500),
      error: http_error(502),
    };
    assert_eq!(
      event.format_retry(),
      "Retrying teachers/7 (retry 2/3) after server_error - waiting 1.5 seconds..."
    );
  }
}
