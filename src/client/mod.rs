//! Request client: the façade callers use for every API call.
//!
//! A GET consults the cache first and only goes to the network on a miss.
//! Every network call runs through the retry executor with a per-attempt
//! timeout, and every failure comes back as an [`ApiError`].

mod options;
mod response;
pub mod transport;


pub use options::{Credentials, RequestOptions};
pub use response::ApiResponse;
pub use transport::{
  HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError, TransportErrorKind,
};

use color_eyre::{eyre::eyre, Result};
use reqwest::header::{
  HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, COOKIE,
};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use url::Url;

use crate::cache::{cache_key, normalize_endpoint, resource_prefix, stable_serialize, CacheLayer};
use crate::config::Config;
use crate::error::{classify_response, classify_transport, ApiError, ErrorCode};
use crate::retry::{execute_with_retry_observed, Retry, RetryObserver, TracingObserver};
use response::parse_body;

/// Per-attempt timeout used when neither the config nor the call sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest body excerpt written to trace logs.
const MAX_LOGGED_BODY: usize = 2048;

/// API client with caching, retries and timeouts.
#[derive(Clone)]
pub struct ApiClient {
  base_url: Url,
  transport: Arc<dyn Transport>,
  cache: CacheLayer,
  observer: Arc<dyn RetryObserver>,
  default_headers: HeaderMap,
  timeout: Duration,
  retry: Retry,
}

impl ApiClient {
  /// Create a client from application configuration, using reqwest for I/O.
  pub fn new(config: &Config) -> Result<Self> {
    let base_url = config.api.base_url.as_deref().ok_or_else(|| {
      eyre!("No API base URL configured. Set api.base_url in the config file or pass --base-url.")
    })?;
    let base_url =
      Url::parse(base_url).map_err(|e| eyre!("Invalid API base URL '{}': {}", base_url, e))?;

    let transport =
      ReqwestTransport::new().map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let mut default_headers = HeaderMap::new();
    for (name, value) in &config.api.headers {
      let (name, value) = parse_header(name, value)
        .map_err(|e| eyre!("Invalid header '{}' in config: {}", name, e.message))?;
      default_headers.insert(name, value);
    }

    let cache = if config.cache.enabled {
      CacheLayer::in_memory().with_ttl(config.cache.ttl())
    } else {
      CacheLayer::disabled()
    };

    Ok(
      Self::with_transport(base_url, transport)
        .with_cache(cache)
        .with_timeout(config.api.timeout())
        .with_retry(config.retry.to_retry())
        .with_default_headers(default_headers),
    )
  }

  /// Create a client with default settings over the given transport.
  pub fn with_transport(base_url: Url, transport: impl Transport + 'static) -> Self {
    Self {
      base_url: directory_url(base_url),
      transport: Arc::new(transport),
      cache: CacheLayer::in_memory(),
      observer: Arc::new(TracingObserver),
      default_headers: HeaderMap::new(),
      timeout: DEFAULT_TIMEOUT,
      retry: Retry::default(),
    }
  }

  /// Use `cache` for GET responses. Clones of a cache share entries.
  pub fn with_cache(mut self, cache: CacheLayer) -> Self {
    self.cache = cache;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn with_retry(mut self, retry: impl Into<Retry>) -> Self {
    self.retry = retry.into();
    self
  }

  /// Report retries to `observer` instead of the tracing log.
  pub fn with_observer(mut self, observer: impl RetryObserver + 'static) -> Self {
    self.observer = Arc::new(observer);
    self
  }

  pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
    self.default_headers = headers;
    self
  }

  /// Add `headers` to the default headers, replacing same-named ones.
  pub fn with_extra_headers(mut self, headers: HeaderMap) -> Self {
    self.default_headers.extend(headers);
    self
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  pub fn cache(&self) -> &CacheLayer {
    &self.cache
  }

  /// Fetch `endpoint`, serving from the cache when a fresh entry exists.
  ///
  /// A cache hit makes no network call and does not involve the retry
  /// executor.
  pub async fn get(&self, endpoint: &str, options: &RequestOptions) -> Result<ApiResponse, ApiError> {
    let key = cache_key(endpoint, &options.params);

    if options.cache {
      if let Some(entry) = self.cache.get(&key) {
        debug!("Cache hit for {}", endpoint);
        return Ok(ApiResponse::from_cache(endpoint, &entry));
      }
    }

    let data = self.execute(Method::GET, endpoint, None, options).await?;

    if options.cache {
      self.cache.set(&key, data.clone());
    }
    Ok(ApiResponse::from_network(endpoint, data))
  }

  /// Create a resource.
  pub async fn post<B>(
    &self,
    endpoint: &str,
    payload: &B,
    options: &RequestOptions,
  ) -> Result<ApiResponse, ApiError>
  where
    B: Serialize + ?Sized,
  {
    let body = to_body(payload, endpoint)?;
    self.mutate(Method::POST, endpoint, Some(body), options).await
  }

  /// Replace a resource.
  pub async fn put<B>(
    &self,
    endpoint: &str,
    payload: &B,
    options: &RequestOptions,
  ) -> Result<ApiResponse, ApiError>
  where
    B: Serialize + ?Sized,
  {
    let body = to_body(payload, endpoint)?;
    self.mutate(Method::PUT, endpoint, Some(body), options).await
  }

  /// Delete a resource, optionally sending a body.
  pub async fn delete(
    &self,
    endpoint: &str,
    payload: Option<&Value>,
    options: &RequestOptions,
  ) -> Result<ApiResponse, ApiError> {
    self
      .mutate(Method::DELETE, endpoint, payload.cloned(), options)
      .await
  }

  /// Drop cached responses for endpoints starting with `prefix`, or all of
  /// them for `None`.
  pub fn clear_cache(&self, prefix: Option<&str>) {
    match prefix {
      Some(prefix) => self.cache.invalidate(Some(&normalize_endpoint(prefix))),
      None => self.cache.invalidate(None),
    }
  }

  /// Whether a GET with these options would currently be served from cache.
  pub fn is_cache_valid(&self, endpoint: &str, options: &RequestOptions) -> bool {
    self.cache.is_valid(&cache_key(endpoint, &options.params))
  }

  async fn mutate(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<Value>,
    options: &RequestOptions,
  ) -> Result<ApiResponse, ApiError> {
    let data = self.execute(method, endpoint, body.as_ref(), options).await?;

    if options.invalidate_cache {
      self.cache.invalidate_resource(&resource_prefix(endpoint));
    }
    Ok(ApiResponse::from_network(endpoint, data))
  }

  /// Send one logical request through the retry executor.
  async fn execute(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<&Value>,
    options: &RequestOptions,
  ) -> Result<Value, ApiError> {
    let request = self.build_request(method, endpoint, body, options)?;
    let timeout = options.timeout.unwrap_or(self.timeout);
    let retry = options.retry.as_ref().unwrap_or(&self.retry);

    execute_with_retry_observed(retry, self.observer.as_ref(), endpoint, || {
      self.attempt(request.clone(), endpoint, timeout)
    })
    .await
  }

  /// A single attempt, bounded by `timeout`. Dropping the transport future
  /// on expiry cancels the in-flight call.
  async fn attempt(
    &self,
    request: HttpRequest,
    endpoint: &str,
    timeout: Duration,
  ) -> Result<Value, ApiError> {
    let verbose = cfg!(debug_assertions);
    if verbose {
      debug!(method = %request.method, url = %request.url, "Sending request");
      if let Some(body) = &request.body {
        trace!(body = %excerpt(body), "Request body");
      }
    }

    let started = Instant::now();
    let response = match tokio::time::timeout(timeout, self.transport.send(request)).await {
      Ok(Ok(response)) => response,
      Ok(Err(e)) => return Err(classify_transport(&e, endpoint)),
      Err(_) => {
        return Err(classify_transport(
          &TransportError::timeout(timeout),
          endpoint,
        ))
      }
    };

    if verbose {
      debug!(
        status = response.status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Received response for {}",
        endpoint
      );
      trace!(body = %excerpt(&response.body), "Response body");
    }

    if !response.is_success() {
      return Err(classify_response(&response, endpoint));
    }
    parse_body(&response, endpoint)
  }

  fn build_request(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<&Value>,
    options: &RequestOptions,
  ) -> Result<HttpRequest, ApiError> {
    let url = self.build_url(endpoint, &options.params)?;

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    for (name, value) in &self.default_headers {
      headers.insert(name.clone(), value.clone());
    }
    for (name, value) in &options.headers {
      let (name, value) = parse_header(name, value).map_err(|e| ApiError {
        endpoint: endpoint.to_string(),
        ..e
      })?;
      headers.insert(name, value);
    }

    let body = match body {
      Some(value) => {
        if !headers.contains_key(CONTENT_TYPE) {
          headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        Some(serde_json::to_vec(value).map_err(|e| {
          ApiError::new(ErrorCode::InvalidParams, e.to_string(), endpoint)
        })?)
      }
      None => None,
    };

    let send_credentials = match options.credentials {
      Credentials::Include => true,
      Credentials::Omit => false,
      Credentials::SameOrigin => url.origin() == self.base_url.origin(),
    };
    if !send_credentials {
      headers.remove(AUTHORIZATION);
      headers.remove(COOKIE);
    }

    Ok(HttpRequest {
      method,
      url,
      headers,
      body,
    })
  }

  /// Resolve `endpoint` against the base URL and append query parameters.
  fn build_url(&self, endpoint: &str, params: &Value) -> Result<Url, ApiError> {
    let normalized = normalize_endpoint(endpoint);
    let joined = if normalized.starts_with("http://") || normalized.starts_with("https://") {
      Url::parse(&normalized)
    } else {
      self.base_url.join(&normalized)
    };
    let mut url = joined.map_err(|e| {
      ApiError::new(
        ErrorCode::InvalidParams,
        format!("invalid endpoint '{}': {}", endpoint, e),
        endpoint,
      )
    })?;

    let pairs = query_pairs(params).map_err(|message| {
      ApiError::new(ErrorCode::InvalidParams, message, endpoint)
    })?;
    if !pairs.is_empty() {
      url.query_pairs_mut().extend_pairs(pairs);
    }
    Ok(url)
  }
}

/// Make sure `url` ends with a slash so relative joins append to its path.
fn directory_url(mut url: Url) -> Url {
  if !url.path().ends_with('/') {
    let path = format!("{}/", url.path());
    url.set_path(&path);
  }
  url
}

fn to_body<B: Serialize + ?Sized>(payload: &B, endpoint: &str) -> Result<Value, ApiError> {
  serde_json::to_value(payload).map_err(|e| {
    ApiError::new(
      ErrorCode::InvalidParams,
      format!("request body could not be serialized: {}", e),
      endpoint,
    )
  })
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ApiError> {
  let invalid = |e: String| ApiError::new(ErrorCode::InvalidParams, e, "");
  let name = HeaderName::from_bytes(name.as_bytes())
    .map_err(|e| invalid(format!("invalid header name '{}': {}", name, e)))?;
  let value = HeaderValue::from_str(value)
    .map_err(|e| invalid(format!("invalid value for header '{}': {}", name, e)))?;
  Ok((name, value))
}

/// Flatten a params object into query pairs, sorted by key.
///
/// Strings are sent verbatim, numbers and booleans stringified, arrays as
/// repeated keys, nulls skipped and nested objects as canonical JSON.
fn query_pairs(params: &Value) -> std::result::Result<Vec<(String, String)>, String> {
  let map = match params {
    Value::Null => return Ok(Vec::new()),
    Value::Object(map) => map,
    other => {
      return Err(format!(
        "query parameters must be an object, got {}",
        stable_serialize(other)
      ))
    }
  };

  let mut keys: Vec<&String> = map.keys().collect();
  keys.sort();

  let mut pairs = Vec::new();
  for key in keys {
    match &map[key] {
      Value::Array(items) => {
        for item in items {
          if let Some(value) = query_value(item) {
            pairs.push((key.clone(), value));
          }
        }
      }
      value => {
        if let Some(value) = query_value(value) {
          pairs.push((key.clone(), value));
        }
      }
    }
  }
  Ok(pairs)
}

fn query_value(value: &Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(s) => Some(s.clone()),
    Value::Bool(b) => Some(b.to_string()),
    Value::Number(n) => Some(n.to_string()),
    other => Some(stable_serialize(other)),
  }
}

fn excerpt(body: &[u8]) -> String {
  let text = String::from_utf8_lossy(body);
  if text.len() <= MAX_LOGGED_BODY {
    return text.into_owned();
  }
  let mut end = MAX_LOGGED_BODY;
  while !text.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}... ({} bytes)", &text[..end], body.len())
}
