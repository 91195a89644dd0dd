//! In-process response cache.
//!
//! This module provides the caching mechanism used by the request client:
//! - Deterministic keys from an endpoint plus its query parameters
//! - TTL-based freshness with lazy expiry
//! - Prefix invalidation after writes
//!
//! The cache is an explicit value owned by the client, not a global.

mod key;
mod layer;
mod storage;

pub use key::{cache_key, normalize_endpoint, resource_prefix, stable_serialize};
pub use layer::{CacheLayer, DEFAULT_TTL};
pub use storage::{CacheEntry, CacheStorage, MemoryStorage, NoopStorage};
