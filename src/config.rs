use serde::Deserialize;

use crate::RetryError;

/// Delta added to the server-computed wait to absorb clock skew.
pub const DEFAULT_BACKOFF_SECONDS_DELTA: u32 = 1;

/// Configures how rate-limited requests are retried.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Overall budget for a call in seconds. Zero or negative disables it.
    pub request_timeout_secs: i64,
    /// Seconds added to every computed backoff.
    pub backoff_seconds_delta: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            request_timeout_secs: 0,
            backoff_seconds_delta: DEFAULT_BACKOFF_SECONDS_DELTA,
        }
    }
}

impl RetryConfig {
    /// Reads the configuration from environment variables.
    ///
    /// Reads:
    /// - `RATELIMIT_MAX_RETRIES`
    /// - `RATELIMIT_REQUEST_TIMEOUT` (seconds)
    /// - `RATELIMIT_BACKOFF_DELTA` (seconds)
    ///
    /// Unset variables fall back to [`RetryConfig::default`]. A variable that
    /// is set but cannot be parsed is an error. The result is validated.
    pub fn from_env() -> Result<Self, RetryError> {
        let defaults = Self::default();
        let config = Self {
            max_retries: env_or("RATELIMIT_MAX_RETRIES", defaults.max_retries)?,
            request_timeout_secs: env_or(
                "RATELIMIT_REQUEST_TIMEOUT",
                defaults.request_timeout_secs,
            )?,
            backoff_seconds_delta: env_or(
                "RATELIMIT_BACKOFF_DELTA",
                defaults.backoff_seconds_delta,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Returns `true` when an overall request timeout is configured.
    pub fn has_timeout(&self) -> bool {
        self.request_timeout_secs > 0
    }

    /// Checks that the backoff delta fits inside a positive request timeout.
    pub fn validate(&self) -> Result<(), RetryError> {
        let delta = i64::from(self.backoff_seconds_delta);
        if self.has_timeout() && delta > self.request_timeout_secs {
            return Err(RetryError::Config(format!(
                "backoff delta ({}s) cannot be greater than the request timeout ({}s)",
                self.backoff_seconds_delta, self.request_timeout_secs
            )));
        }
        Ok(())
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T, RetryError>
where
    T: std::str::FromStr,
{
    match std::env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(default),
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| RetryError::Config(format!("{name} is not a valid number: '{raw}'"))),
        Err(_) => Ok(default),
    }
}
