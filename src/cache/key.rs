//! Deterministic cache keys.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Normalize an endpoint so `/items/`, `items/` and `items` share keys.
///
/// Absolute URLs keep their scheme and host; only a trailing slash is removed.
pub fn normalize_endpoint(endpoint: &str) -> String {
  let endpoint = endpoint.trim();
  if is_absolute(endpoint) {
    endpoint.trim_end_matches('/').to_string()
  } else {
    endpoint.trim_matches('/').to_string()
  }
}

/// Build the cache key for a read of `endpoint` with query `params`.
///
/// The endpoint stays readable at the front of the key so that prefix
/// invalidation can target it; the parameters are hashed after canonical
/// serialization, so key order in `params` never changes the key.
pub fn cache_key(endpoint: &str, params: &Value) -> String {
  let mut hasher = Sha256::new();
  hasher.update(stable_serialize(params).as_bytes());
  format!("{}:{}", normalize_endpoint(endpoint), hex::encode(hasher.finalize()))
}

/// Resource root that covers an endpoint, its sub-paths and its parent
/// collection.
///
/// `items/42/notes` → `items`. Used with
/// [`CacheLayer::invalidate_resource`](super::CacheLayer::invalidate_resource),
/// which only matches keys continuing with `:`, `/` or `?` after the root, so
/// a sibling such as `items_archive` is left alone.
pub fn resource_prefix(endpoint: &str) -> String {
  let normalized = normalize_endpoint(endpoint);
  if is_absolute(&normalized) {
    return normalized;
  }
  match normalized.find(['/', '?']) {
    Some(idx) => normalized[..idx].to_string(),
    None => normalized,
  }
}

/// JSON serialization with object keys sorted at every depth.
pub fn stable_serialize(value: &Value) -> String {
  let mut out = String::new();
  write_stable(value, &mut out);
  out
}

fn write_stable(value: &Value, out: &mut String) {
  match value {
    Value::Object(map) => {
      let mut entries: Vec<_> = map.iter().collect();
      entries.sort_by(|a, b| a.0.cmp(b.0));
      out.push('{');
      for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_stable(value, out);
      }
      out.push('}');
    }
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_stable(item, out);
      }
      out.push(']');
    }
    scalar => out.push_str(&scalar.to_string()),
  }
}

fn is_absolute(endpoint: &str) -> bool {
  endpoint.starts_with("http://") || endpoint.starts_with("https://")
}
