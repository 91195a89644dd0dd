//! Client core for the content directory REST API.
//!
//! [`ApiClient`] wraps every call with a GET response cache, retries with
//! exponential backoff, per-attempt timeouts and a single error shape,
//! [`ApiError`].

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

pub use cache::CacheLayer;
pub use client::{ApiClient, ApiResponse, Credentials, RequestOptions};
pub use error::{ApiError, ErrorCode};
pub use retry::{Retry, RetryPolicy};
