//! `ratelimit-retry` wraps outbound HTTP calls against rate-limited APIs.
//!
//! Responses with a retryable status (by default `429 Too Many Requests`) are
//! retried after the wait the server announces through its `Date` and
//! `x-rate-limit-reset` headers, bounded by a retry count and an overall time
//! budget. Entry points:
//! - [`RetryExecutor::execute_with_retry`]
//! - [`RateLimitedClient::send`]

mod client;
mod clone;
mod config;
mod envelope;
mod error;
mod executor;
pub mod headers;
mod policy;
mod transport;

pub use client::RateLimitedClient;
pub use clone::clone_request;
pub use config::{RetryConfig, DEFAULT_BACKOFF_SECONDS_DELTA};
pub use envelope::{Body, Metadata, RequestEnvelope, ResponseEnvelope};
pub use error::{RetryError, TransportError};
pub use executor::RetryExecutor;
pub use policy::{rate_limit_delay, RateLimitPolicy, RetryPolicy};
pub use transport::{ReqwestTransport, Transport};

pub type Result<T> = std::result::Result<T, RetryError>;

pub use tokio_util::sync::CancellationToken;
