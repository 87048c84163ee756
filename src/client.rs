use std::fmt;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use tokio_util::sync::CancellationToken;

use crate::{
    policy::{RateLimitPolicy, RetryPolicy},
    RequestEnvelope, ResponseEnvelope, Result, RetryConfig, RetryError, RetryExecutor,
    ReqwestTransport, Transport,
};

/// HTTP client that transparently waits out rate limits.
///
/// Pairs a [`Transport`] with a [`RetryExecutor`]. The default transport is
/// [`ReqwestTransport`].
#[derive(Clone)]
pub struct RateLimitedClient<T = ReqwestTransport, P = RateLimitPolicy> {
    transport: T,
    executor: RetryExecutor<P>,
    authorization: Option<HeaderValue>,
}

impl<T, P> fmt::Debug for RateLimitedClient<T, P>
where
    P: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitedClient")
            .field("executor", &self.executor)
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl RateLimitedClient {
    /// Creates a client over a default `reqwest::Client`.
    ///
    /// Fails with [`RetryError::Config`] if the configuration is invalid.
    pub fn new(config: RetryConfig) -> Result<Self> {
        Self::from_reqwest(reqwest::Client::new(), config)
    }

    /// Creates a client over an existing `reqwest::Client`, sharing its
    /// connection pool.
    pub fn from_reqwest(http: reqwest::Client, config: RetryConfig) -> Result<Self> {
        Ok(Self::with_transport(
            ReqwestTransport::new(http),
            RetryExecutor::new(config)?,
        ))
    }

    /// Creates a client configured from `RATELIMIT_*` environment variables.
    ///
    /// See [`RetryConfig::from_env`] for the variables read.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ratelimit_retry::RateLimitedClient;
    ///
    /// let client = RateLimitedClient::from_env().expect("invalid RATELIMIT_* env vars");
    /// ```
    pub fn from_env() -> Result<Self> {
        Self::new(RetryConfig::from_env()?)
    }
}

impl<T, P> RateLimitedClient<T, P>
where
    T: Transport,
    P: RetryPolicy,
{
    /// Creates a client from an existing transport and executor.
    pub fn with_transport(transport: T, executor: RetryExecutor<P>) -> Self {
        Self {
            transport,
            executor,
            authorization: None,
        }
    }

    /// Replaces the retry policy, keeping the transport and configuration.
    pub fn with_policy<Q>(self, policy: Q) -> Result<RateLimitedClient<T, Q>>
    where
        Q: RetryPolicy,
    {
        let executor = RetryExecutor::with_policy(self.executor.config().clone(), policy)?;
        Ok(RateLimitedClient {
            transport: self.transport,
            executor,
            authorization: self.authorization,
        })
    }

    /// Sets the `Authorization` value added to requests that carry none.
    ///
    /// A bare API token gets the `SSWS` scheme prepended.
    pub fn with_authorization(mut self, token: impl AsRef<str>) -> Result<Self> {
        let normalized = normalize_ssws_authorization(token.as_ref());
        let mut value = HeaderValue::from_str(&normalized).map_err(|_| {
            RetryError::Config("authorization value is not a valid header".to_owned())
        })?;
        value.set_sensitive(true);
        self.authorization = Some(value);
        Ok(self)
    }

    /// Returns the retry executor.
    pub fn executor(&self) -> &RetryExecutor<P> {
        &self.executor
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends `request`, retrying rate-limited responses.
    pub async fn send(
        &self,
        mut request: RequestEnvelope,
        cancel: &CancellationToken,
    ) -> Result<ResponseEnvelope> {
        if let Some(authorization) = &self.authorization {
            if !request.headers().contains_key(AUTHORIZATION) {
                request
                    .headers_mut()
                    .insert(AUTHORIZATION, authorization.clone());
            }
        }

        self.executor
            .execute_with_retry(request, cancel, &self.transport)
            .await
    }
}

fn normalize_ssws_authorization(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.contains(' ') {
        trimmed.to_owned()
    } else {
        format!("SSWS {trimmed}")
    }
}
