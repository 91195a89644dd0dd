//! Retry and backoff policy.
//!
//! Transient failures (timeouts, dropped connections, 5xx, 408/429) are
//! retried with capped exponential backoff; everything else is surfaced to
//! the caller on the first failure.

mod backoff;
mod policy;
mod run;

pub use backoff::compute_delay;
pub use policy::{Retry, RetryPolicy, ShouldRetryFn, DEFAULT_RETRYABLE_STATUSES};
pub use run::{
  execute_with_retry, execute_with_retry_observed, RetryEvent, RetryObserver, TracingObserver,
};
