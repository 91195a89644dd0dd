use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{Retry, RetryPolicy, DEFAULT_RETRYABLE_STATUSES};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Base URL that relative endpoints are resolved against
  pub base_url: Option<String>,
  /// Per-attempt request timeout in milliseconds
  pub timeout_ms: u64,
  /// Headers sent with every request
  pub headers: BTreeMap<String, String>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: None,
      timeout_ms: 30_000,
      headers: BTreeMap::new(),
    }
  }
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub enabled: bool,
  /// Time-to-live of cached GET responses, in seconds
  pub ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      ttl_secs: 300,
    }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_secs(self.ttl_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub enabled: bool,
  /// Retries after the first attempt
  pub max_retries: u32,
  pub base_delay_ms: u64,
  pub max_delay_ms: u64,
  pub jitter: bool,
  pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      max_retries: 3,
      base_delay_ms: 1000,
      max_delay_ms: 30_000,
      jitter: true,
      retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
    }
  }
}

impl RetryConfig {
  /// Build the client-wide retry setting.
  pub fn to_retry(&self) -> Retry {
    if !self.enabled {
      return Retry::Disabled;
    }
    Retry::Policy(RetryPolicy {
      max_retries: self.max_retries,
      base_delay: Duration::from_millis(self.base_delay_ms),
      max_delay: Duration::from_millis(self.max_delay_ms),
      jitter: self.jitter,
      retryable_statuses: self.retryable_statuses.iter().copied().collect(),
      should_retry: None,
    })
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./catalog.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/catalog/config.yaml
  ///
  /// Without any file the built-in defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => {
        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("catalog.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("catalog").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  pub fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert!(config.api.base_url.is_none());
    assert_eq!(config.api.timeout(), Duration::from_secs(30));
    assert!(config.cache.enabled);
    assert_eq!(config.cache.ttl(), Duration::from_secs(300));
    assert!(config.retry.enabled);
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.retry.retryable_statuses, vec![408, 429, 500, 502, 503, 504]);
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::from_yaml(
      r#"
api:
  base_url: https://directory.example.org/api/
  headers:
    x-client: catalog
retry:
  max_retries: 5
  jitter: false
"#,
    )
    .unwrap();

    assert_eq!(
      config.api.base_url.as_deref(),
      Some("https://directory.example.org/api/")
    );
    assert_eq!(config.api.timeout_ms, 30_000);
    assert_eq!(config.api.headers.get("x-client").map(String::as_str), Some("catalog"));
    assert!(config.cache.enabled);
    assert_eq!(config.retry.max_retries, 5);
    assert!(!config.retry.jitter);
    assert_eq!(config.retry.base_delay_ms, 1000);
  }

  #[test]
  fn test_retry_config_to_retry() {
    let config = RetryConfig {
      max_retries: 2,
      base_delay_ms: 50,
      max_delay_ms: 400,
      jitter: false,
      retryable_statuses: vec![503],
      ..RetryConfig::default()
    };

    match config.to_retry() {
      Retry::Policy(policy) => {
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, Duration::from_millis(400));
        assert!(!policy.jitter);
        assert!(policy.retryable_statuses.contains(&503));
        assert!(!policy.retryable_statuses.contains(&429));
      }
      Retry::Disabled => panic!("expected a policy"),
    }

    let disabled = RetryConfig {
      enabled: false,
      ..RetryConfig::default()
    };
    assert!(matches!(disabled.to_retry(), Retry::Disabled));
  }

  #[test]
  fn test_load_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "cache:\n  enabled: false\n  ttl_secs: 10").unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert!(!config.cache.enabled);
    assert_eq!(config.cache.ttl_secs, 10);
  }

  #[test]
  fn test_load_missing_explicit_path_fails() {
    let err = Config::load(Some(Path::new("/nonexistent/catalog.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_invalid_yaml_fails() {
    assert!(Config::from_yaml("retry: [1, 2").is_err());
  }
}
