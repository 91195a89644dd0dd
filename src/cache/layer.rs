//! TTL policy on top of a cache storage backend.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::storage::{CacheEntry, CacheStorage, MemoryStorage, NoopStorage};

/// Default time-to-live for cached responses.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Cache store shared by every request made through one client.
///
/// Expiry is lazy: an entry older than the TTL is reported as absent but
/// stays in storage until it is overwritten or invalidated.
pub struct CacheLayer {
  storage: Arc<dyn CacheStorage>,
  /// How long before cached data is considered stale
  ttl: Duration,
}

impl CacheLayer {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: impl CacheStorage + 'static) -> Self {
    Self {
      storage: Arc::new(storage),
      ttl: DEFAULT_TTL,
    }
  }

  /// In-memory cache with the default TTL.
  pub fn in_memory() -> Self {
    Self::new(MemoryStorage::new())
  }

  /// A cache that never stores anything.
  pub fn disabled() -> Self {
    Self::new(NoopStorage)
  }

  /// Set the time-to-live for cached data.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  fn is_fresh(&self, entry: &CacheEntry) -> bool {
    entry.inserted.elapsed() < self.ttl
  }

  /// Get a fresh entry for `key`, or `None` if missing or expired.
  pub fn get(&self, key: &str) -> Option<CacheEntry> {
    self.storage.get(key).filter(|entry| self.is_fresh(entry))
  }

  /// Store `value` under `key`, stamped with the current time.
  pub fn set(&self, key: &str, value: Value) {
    self.storage.put(CacheEntry::new(key, value));
  }

  pub fn is_valid(&self, key: &str) -> bool {
    self.get(key).is_some()
  }

  /// Drop entries whose key starts with `prefix`, or everything for `None`.
  pub fn invalidate(&self, prefix: Option<&str>) {
    match prefix {
      Some(prefix) => {
        let removed = self.storage.remove_prefix(prefix);
        debug!("Invalidated {} cache entries with prefix '{}'", removed, prefix);
      }
      None => {
        self.storage.clear();
        debug!("Cleared response cache");
      }
    }
  }

  /// Drop cached reads of `root` and everything below it.
  ///
  /// Matches keys for `root` itself, its sub-paths and query variants, but
  /// not siblings that merely share the prefix (`items_archive` for `items`).
  pub fn invalidate_resource(&self, root: &str) {
    let removed: usize = [':', '/', '?']
      .iter()
      .map(|boundary| self.storage.remove_prefix(&format!("{}{}", root, boundary)))
      .sum();
    debug!("Invalidated {} cache entries under '{}'", removed, root);
  }

  /// Empty the cache. Intended for isolating tests.
  pub fn reset(&self) {
    self.storage.clear();
  }

  /// Number of stored entries, including expired ones not yet overwritten.
  pub fn len(&self) -> usize {
    self.storage.len()
  }

  pub fn is_empty(&self) -> bool {
    self.storage.is_empty()
  }
}

impl Default for CacheLayer {
  fn default() -> Self {
    Self::in_memory()
  }
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      ttl: self.ttl,
    }
  }
}
