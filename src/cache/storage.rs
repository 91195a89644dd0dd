//! Cache storage trait and in-memory implementation.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

/// A cached response body.
///
/// Entries are replaced wholesale on re-fetch and never mutated in place.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub key: String,
  pub value: Arc<Value>,
  /// Wall-clock time the entry was stored, for display
  pub stored_at: DateTime<Utc>,
  /// Monotonic time the entry was stored, used for TTL checks
  pub inserted: Instant,
}

impl CacheEntry {
  pub fn new(key: impl Into<String>, value: Value) -> Self {
    Self {
      key: key.into(),
      value: Arc::new(value),
      stored_at: Utc::now(),
      inserted: Instant::now(),
    }
  }
}

/// Trait for cache storage backends.
///
/// Backends store and return entries as-is; freshness is decided by the
/// [`CacheLayer`](super::CacheLayer).
pub trait CacheStorage: Send + Sync {
  /// Get the entry stored under `key`, fresh or not.
  fn get(&self, key: &str) -> Option<CacheEntry>;

  /// Store an entry, replacing any existing one with the same key.
  fn put(&self, entry: CacheEntry);

  /// Remove every entry whose key starts with `prefix`. Returns how many
  /// were removed.
  fn remove_prefix(&self, prefix: &str) -> usize;

  /// Remove everything.
  fn clear(&self);

  /// Number of stored entries, fresh or stale.
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _key: &str) -> Option<CacheEntry> {
    None // Always miss
  }

  fn put(&self, _entry: CacheEntry) {
    // Discard
  }

  fn remove_prefix(&self, _prefix: &str) -> usize {
    0
  }

  fn clear(&self) {}

  fn len(&self) -> usize {
    0
  }
}

/// Process-local map of cached responses.
///
/// Unbounded: entries are only ever dropped by invalidation or replaced on
/// re-fetch. Stale entries linger until one of those happens.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
    // Every operation is a single map call, so a poisoned map is still whole.
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, key: &str) -> Option<CacheEntry> {
    self.lock().get(key).cloned()
  }

  fn put(&self, entry: CacheEntry) {
    self.lock().insert(entry.key.clone(), entry);
  }

  fn remove_prefix(&self, prefix: &str) -> usize {
    let mut entries = self.lock();
    let before = entries.len();
    entries.retain(|key, _| !key.starts_with(prefix));
    before - entries.len()
  }

  fn clear(&self) {
    self.lock().clear();
  }

  fn len(&self) -> usize {
    self.lock().len()
  }
}
