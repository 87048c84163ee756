use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    clone::clone_request,
    headers::{annotate_retry, REQUEST_ID},
    policy::{RateLimitPolicy, RetryPolicy},
    RequestEnvelope, ResponseEnvelope, Result, RetryConfig, RetryError, Transport,
};

/// Runs requests through a [`Transport`], retrying rate-limited responses.
///
/// The executor holds no per-call state and can be shared between
/// concurrent calls.
#[derive(Clone, Debug)]
pub struct RetryExecutor<P = RateLimitPolicy> {
    config: RetryConfig,
    policy: P,
}

impl RetryExecutor<RateLimitPolicy> {
    /// Creates an executor that retries `429 Too Many Requests`.
    ///
    /// Fails with [`RetryError::Config`] if the configuration is invalid.
    pub fn new(config: RetryConfig) -> Result<Self> {
        Self::with_policy(config, RateLimitPolicy::default())
    }
}

impl<P> RetryExecutor<P>
where
    P: RetryPolicy,
{
    /// Creates an executor with a custom retry policy.
    pub fn with_policy(config: RetryConfig, policy: P) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, policy })
    }

    /// Returns the validated retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Returns the policy deciding which responses are retried.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Sends `request`, retrying while the policy deems the response
    /// retryable and the retry and time budgets allow it.
    ///
    /// The first attempt sends `request` itself; every retry sends a fresh
    /// copy stamped with retry provenance headers. Transport errors are
    /// returned immediately. When `cancel` fires during a network wait or a
    /// backoff sleep the call fails with [`RetryError::Cancelled`].
    pub async fn execute_with_retry<T>(
        &self,
        request: RequestEnvelope,
        cancel: &CancellationToken,
        transport: &T,
    ) -> Result<ResponseEnvelope>
    where
        T: Transport + ?Sized,
    {
        let mut state = RetryState::new(request);

        loop {
            let response = Self::attempt(&state.request, cancel, transport).await?;

            let Some(delay) = self.next_delay(&state, &response) else {
                return Ok(response);
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(
                status = response.status().as_u16(),
                attempt = state.attempt + 1,
                delay_secs = delay.as_secs(),
                "rate limited, retrying request to {}",
                state.request.url()
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("request cancelled during backoff");
                    return Err(RetryError::Cancelled);
                }
                () = tokio::time::sleep(delay) => {}
            }

            state.attempt += 1;
            let request_id = response.headers().get(REQUEST_ID);
            let next = clone_request(&state.request);
            state.request = annotate_retry(next, request_id, state.attempt);
        }
    }

    async fn attempt<T>(
        request: &RequestEnvelope,
        cancel: &CancellationToken,
        transport: &T,
    ) -> Result<ResponseEnvelope>
    where
        T: Transport + ?Sized,
    {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RetryError::Cancelled),
            result = transport.send(request, cancel) => result.map_err(|err| {
                if cancel.is_cancelled() {
                    RetryError::Cancelled
                } else {
                    RetryError::Transport(err)
                }
            }),
        }
    }

    /// Returns the backoff before the next attempt, or `None` when `response`
    /// should be handed back to the caller.
    fn next_delay(&self, state: &RetryState, response: &ResponseEnvelope) -> Option<Duration> {
        if !self.policy.is_retryable(response) {
            return None;
        }

        if state.attempt >= self.config.max_retries {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                retries = state.attempt,
                "retry limit reached, returning rate limited response"
            );
            return None;
        }

        if self.config.has_timeout() && state.elapsed_secs() >= self.config.request_timeout_secs {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                timeout_secs = self.config.request_timeout_secs,
                "request timeout reached, returning rate limited response"
            );
            return None;
        }

        let delay = self.policy.compute_delay(
            response,
            self.config.backoff_seconds_delta,
            self.config.request_timeout_secs,
        );
        (!delay.is_zero()).then_some(delay)
    }
}

/// Bookkeeping for a single top-level call.
struct RetryState {
    attempt: u32,
    started: Instant,
    request: RequestEnvelope,
}

impl RetryState {
    fn new(request: RequestEnvelope) -> Self {
        Self {
            attempt: 0,
            started: Instant::now(),
            request,
        }
    }

    /// Whole seconds since the call started.
    fn elapsed_secs(&self) -> i64 {
        i64::try_from(self.started.elapsed().as_secs()).unwrap_or(i64::MAX)
    }
}
