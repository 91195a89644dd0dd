//! Delay between retries: capped exponential backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

use super::policy::RetryPolicy;

/// Lower bound of the jitter factor.
const JITTER_MIN: f64 = 0.75;
/// Upper bound of the jitter factor.
const JITTER_MAX: f64 = 1.25;

/// Delay before retry number `attempt + 1`.
///
/// `attempt` is 0-based: attempt 0 waits `base`, attempt 1 waits `2 * base`,
/// and so on, capped at `max_delay`. With jitter enabled the capped value is
/// scaled by a random factor in `[0.75, 1.25]` and floored to whole
/// milliseconds.
pub fn compute_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
  let capped = capped_delay(attempt, policy);
  if !policy.jitter {
    return capped;
  }
  let factor = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
  apply_jitter(capped, factor)
}

fn capped_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
  let base_ms = policy.base_delay.as_millis().min(u64::MAX as u128) as u64;
  let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
  let raw = Duration::from_millis(base_ms.saturating_mul(multiplier));
  raw.min(policy.max_delay)
}

fn apply_jitter(delay: Duration, factor: f64) -> Duration {
  let ms = (delay.as_millis() as f64 * factor).floor();
  Duration::from_millis(ms as u64)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn policy(base_ms: u64, max_ms: u64, jitter: bool) -> RetryPolicy {
    RetryPolicy::default()
      .with_base_delay(Duration::from_millis(base_ms))
      .with_max_delay(Duration::from_millis(max_ms))
      .with_jitter(jitter)
  }

  #[test]
  fn test_exponential_growth() {
    let p = policy(100, 60_000, false);
    assert_eq!(compute_delay(0, &p), Duration::from_millis(100));
    assert_eq!(compute_delay(1, &p), Duration::from_millis(200));
    assert_eq!(compute_delay(2, &p), Duration::from_millis(400));
    assert_eq!(compute_delay(3, &p), Duration::from_millis(800));
  }

  #[test]
  fn test_capped_and_monotonic() {
    let p = policy(250, 5_000, false);
    let mut previous = Duration::ZERO;
    for attempt in 0..80 {
      let delay = compute_delay(attempt, &p);
      assert!(delay >= previous, "attempt {}", attempt);
      assert!(delay <= p.max_delay, "attempt {}", attempt);
      previous = delay;
    }
    assert_eq!(compute_delay(79, &p), Duration::from_millis(5_000));
  }

  #[test]
  fn test_deterministic_without_jitter() {
    let p = policy(300, 10_000, false);
    for attempt in 0..6 {
      assert_eq!(compute_delay(attempt, &p), compute_delay(attempt, &p));
    }
  }

  #[test]
  fn test_jitter_stays_in_bounds() {
    let p = policy(1_000, 30_000, true);
    for _ in 0..200 {
      let delay = compute_delay(2, &p).as_millis();
      assert!((3_000..=5_000).contains(&delay), "delay {}", delay);
    }
  }

  #[test]
  fn test_apply_jitter_floors() {
    assert_eq!(
      apply_jitter(Duration::from_millis(333), 0.75),
      Duration::from_millis(249)
    );
    assert_eq!(
      apply_jitter(Duration::from_millis(1000), 1.25),
      Duration::from_millis(1250)
    );
  }

  #[test]
  fn test_zero_base_delay() {
    let p = policy(0, 1_000, true);
    assert_eq!(compute_delay(5, &p), Duration::ZERO);
  }
}
