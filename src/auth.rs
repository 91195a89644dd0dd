//! Access token sources.
//!
//! The client never asks for a token on its own; callers fetch one and turn
//! it into default headers with [`bearer_headers`].

use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use crate::error::{ApiError, ErrorCode};

/// Environment variables checked by [`EnvTokenProvider`], in order.
pub const TOKEN_ENV_VARS: [&str; 2] = ["CATALOG_API_TOKEN", "API_TOKEN"];

pub trait TokenProvider: Send + Sync {
  fn token(&self) -> BoxFuture<'_, Result<String, ApiError>>;
}

/// A fixed token.
#[derive(Clone)]
pub struct StaticTokenProvider {
  token: String,
}

impl StaticTokenProvider {
  pub fn new(token: impl Into<String>) -> Self {
    Self {
      token: token.into(),
    }
  }
}

impl std::fmt::Debug for StaticTokenProvider {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StaticTokenProvider")
      .field("token", &"<redacted>")
      .finish()
  }
}

impl TokenProvider for StaticTokenProvider {
  fn token(&self) -> BoxFuture<'_, Result<String, ApiError>> {
    Box::pin(async move { Ok(self.token.clone()) })
  }
}

/// Reads the token from the environment on every call.
#[derive(Debug, Clone)]
pub struct EnvTokenProvider {
  vars: Vec<String>,
}

impl Default for EnvTokenProvider {
  fn default() -> Self {
    Self {
      vars: TOKEN_ENV_VARS.iter().map(|v| v.to_string()).collect(),
    }
  }
}

impl EnvTokenProvider {
  /// Check `vars` in order instead of the default variables.
  pub fn with_vars<I, S>(vars: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      vars: vars.into_iter().map(Into::into).collect(),
    }
  }

  /// First non-empty value among the configured variables.
  pub fn lookup(&self) -> Option<String> {
    self.lookup_with(|var| std::env::var(var).ok())
  }

  /// Like [`lookup`](Self::lookup), reading variables through `read`.
  pub fn lookup_with<F>(&self, read: F) -> Option<String>
  where
    F: Fn(&str) -> Option<String>,
  {
    self
      .vars
      .iter()
      .filter_map(|var| read(var.as_str()))
      .map(|value| value.trim().to_string())
      .find(|value| !value.is_empty())
  }
}

impl TokenProvider for EnvTokenProvider {
  fn token(&self) -> BoxFuture<'_, Result<String, ApiError>> {
    Box::pin(async move {
      self.lookup().ok_or_else(|| {
        ApiError::new(
          ErrorCode::Unauthorized,
          format!("no API token set (checked {})", self.vars.join(", ")),
          "",
        )
        .with_status(401)
      })
    })
  }
}

/// Headers carrying `token` as a bearer credential.
pub fn bearer_headers(token: &str) -> Result<HeaderMap, ApiError> {
  let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
    ApiError::new(
      ErrorCode::InvalidParams,
      format!("token is not a valid header value: {}", e),
      "",
    )
  })?;
  value.set_sensitive(true);

  let mut headers = HeaderMap::new();
  headers.insert(AUTHORIZATION, value);
  Ok(headers)
}
