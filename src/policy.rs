use std::time::{Duration, UNIX_EPOCH};

use reqwest::{
    header::{HeaderMap, DATE},
    StatusCode,
};

use crate::{headers::RATE_LIMIT_RESET, ResponseEnvelope};

/// Decides whether a response should be retried and how long to wait first.
///
/// Implement this to widen or narrow what the executor treats as transient
/// without touching the retry loop.
pub trait RetryPolicy: Send + Sync {
    /// Returns `true` when the response warrants another attempt.
    fn is_retryable(&self, response: &ResponseEnvelope) -> bool;

    /// Computes the wait before the next attempt.
    ///
    /// A zero duration means waiting is pointless and the response should be
    /// returned to the caller as-is.
    fn compute_delay(
        &self,
        response: &ResponseEnvelope,
        backoff_seconds_delta: u32,
        request_timeout_secs: i64,
    ) -> Duration;
}

/// Retries rate-limited responses, waiting until the server says the limit
/// resets.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RateLimitPolicy {
    retryable: Vec<StatusCode>,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            retryable: vec![StatusCode::TOO_MANY_REQUESTS],
        }
    }
}

impl RateLimitPolicy {
    /// Adds a status code to the retryable set.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        if !self.retryable.contains(&status) {
            self.retryable.push(status);
        }
        self
    }

    /// Returns the status codes that trigger a retry.
    pub fn retryable_statuses(&self) -> &[StatusCode] {
        &self.retryable
    }
}

impl RetryPolicy for RateLimitPolicy {
    fn is_retryable(&self, response: &ResponseEnvelope) -> bool {
        self.retryable.contains(&response.status())
    }

    fn compute_delay(
        &self,
        response: &ResponseEnvelope,
        backoff_seconds_delta: u32,
        request_timeout_secs: i64,
    ) -> Duration {
        rate_limit_delay(
            response.headers(),
            backoff_seconds_delta,
            request_timeout_secs,
        )
    }
}

/// Computes `reset - date + delta` from the `Date` and `x-rate-limit-reset`
/// headers.
///
/// Returns zero when either header is missing or unparsable, when the reset
/// is not in the future relative to `Date`, or when a positive
/// `request_timeout_secs` would be exceeded by the wait alone.
pub fn rate_limit_delay(
    headers: &HeaderMap,
    backoff_seconds_delta: u32,
    request_timeout_secs: i64,
) -> Duration {
    let (Some(date), Some(reset)) = (response_date(headers), earliest_reset(headers)) else {
        return Duration::ZERO;
    };

    let delay = reset
        .saturating_sub(date)
        .saturating_add(i64::from(backoff_seconds_delta));
    if request_timeout_secs > 0 && delay > request_timeout_secs {
        return Duration::ZERO;
    }

    u64::try_from(delay)
        .map(Duration::from_secs)
        .unwrap_or(Duration::ZERO)
}

/// Unix seconds of the first `Date` header.
fn response_date(headers: &HeaderMap) -> Option<i64> {
    let raw = headers.get(DATE)?.to_str().ok()?;
    let time = httpdate::parse_http_date(raw.trim()).ok()?;
    let secs = time.duration_since(UNIX_EPOCH).ok()?.as_secs();
    i64::try_from(secs).ok()
}

/// Smallest reset timestamp across every `x-rate-limit-reset` value.
///
/// Values may also be folded into one comma-separated header. Entries that
/// do not parse are skipped.
fn earliest_reset(headers: &HeaderMap) -> Option<i64> {
    headers
        .get_all(RATE_LIMIT_RESET)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|item| item.trim().parse::<i64>().ok())
        .min()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use reqwest::{
        header::{HeaderValue, DATE},
        StatusCode,
    };

    use super::{RateLimitPolicy, RetryPolicy};
    use crate::{headers::RATE_LIMIT_RESET, ResponseEnvelope};

    const T0: u64 = 1_700_000_000;

    fn http_date(secs: u64) -> HeaderValue {
        let formatted = httpdate::fmt_http_date(UNIX_EPOCH + Duration::from_secs(secs));
        HeaderValue::from_str(&formatted).expect("http date is a valid header value")
    }

    fn rate_limited(date: u64, resets: &[u64]) -> ResponseEnvelope {
        let mut response = ResponseEnvelope::new(StatusCode::TOO_MANY_REQUESTS)
            .with_header(DATE, http_date(date));
        for reset in resets {
            response = response.with_header(RATE_LIMIT_RESET, HeaderValue::from(*reset));
        }
        response
    }

    #[test]
    fn only_429_is_retryable_by_default() {
        let policy = RateLimitPolicy::default();
        assert!(policy.is_retryable(&ResponseEnvelope::new(StatusCode::TOO_MANY_REQUESTS)));
        assert!(!policy.is_retryable(&ResponseEnvelope::new(StatusCode::OK)));
        assert!(!policy.is_retryable(&ResponseEnvelope::new(
            StatusCode::SERVICE_UNAVAILABLE
        )));
    }

    #[test]
    fn retryable_set_can_be_extended() {
        let policy = RateLimitPolicy::default()
            .with_status(StatusCode::SERVICE_UNAVAILABLE)
            .with_status(StatusCode::SERVICE_UNAVAILABLE);

        assert_eq!(policy.retryable_statuses().len(), 2);
        assert!(policy.is_retryable(&ResponseEnvelope::new(
            StatusCode::SERVICE_UNAVAILABLE
        )));
    }

    #[test]
    fn delay_is_reset_minus_date_plus_delta() {
        let policy = RateLimitPolicy::default();
        let response = rate_limited(T0, &[T0 + 5]);
        assert_eq!(policy.compute_delay(&response, 1, 0), Duration::from_secs(6));
    }

    #[test]
    fn earliest_reset_wins() {
        let policy = RateLimitPolicy::default();
        let response = rate_limited(T0, &[T0 + 30, T0 + 4, T0 + 10]);
        assert_eq!(policy.compute_delay(&response, 1, 0), Duration::from_secs(5));
    }

    #[test]
    fn comma_folded_resets_are_split() {
        let policy = RateLimitPolicy::default();
        let response = ResponseEnvelope::new(StatusCode::TOO_MANY_REQUESTS)
            .with_header(DATE, http_date(T0))
            .with_header(
                RATE_LIMIT_RESET,
                HeaderValue::from_str(&format!("{}, {}", T0 + 9, T0 + 2)).expect("valid value"),
            );
        assert_eq!(policy.compute_delay(&response, 0, 0), Duration::from_secs(2));
    }

    #[test]
    fn delay_exceeding_timeout_is_zero() {
        let policy = RateLimitPolicy::default();
        let response = rate_limited(T0, &[T0 + 5]);
        assert_eq!(policy.compute_delay(&response, 1, 3), Duration::ZERO);
    }

    #[test]
    fn delay_equal_to_timeout_is_kept() {
        let policy = RateLimitPolicy::default();
        let response = rate_limited(T0, &[T0 + 5]);
        assert_eq!(policy.compute_delay(&response, 1, 6), Duration::from_secs(6));
    }

    #[test]
    fn delay_over_a_minute_is_compared_in_total_seconds() {
        let policy = RateLimitPolicy::default();
        let response = rate_limited(T0, &[T0 + 65]);
        assert_eq!(policy.compute_delay(&response, 1, 10), Duration::ZERO);
        assert_eq!(policy.compute_delay(&response, 1, 0), Duration::from_secs(66));
        assert_eq!(policy.compute_delay(&response, 1, 66), Duration::from_secs(66));
    }

    #[test]
    fn missing_headers_yield_zero() {
        let policy = RateLimitPolicy::default();

        let no_reset = ResponseEnvelope::new(StatusCode::TOO_MANY_REQUESTS)
            .with_header(DATE, http_date(T0));
        assert_eq!(policy.compute_delay(&no_reset, 1, 0), Duration::ZERO);

        let no_date = ResponseEnvelope::new(StatusCode::TOO_MANY_REQUESTS)
            .with_header(RATE_LIMIT_RESET, HeaderValue::from(T0 + 5));
        assert_eq!(policy.compute_delay(&no_date, 1, 0), Duration::ZERO);
    }

    #[test]
    fn malformed_values_are_treated_as_absent() {
        let policy = RateLimitPolicy::default();

        let bad_date = ResponseEnvelope::new(StatusCode::TOO_MANY_REQUESTS)
            .with_header(DATE, HeaderValue::from_static("yesterday-ish"))
            .with_header(RATE_LIMIT_RESET, HeaderValue::from(T0 + 5));
        assert_eq!(policy.compute_delay(&bad_date, 1, 0), Duration::ZERO);

        let bad_reset = ResponseEnvelope::new(StatusCode::TOO_MANY_REQUESTS)
            .with_header(DATE, http_date(T0))
            .with_header(RATE_LIMIT_RESET, HeaderValue::from_static("soon"));
        assert_eq!(policy.compute_delay(&bad_reset, 1, 0), Duration::ZERO);

        let mixed = rate_limited(T0, &[T0 + 7])
            .with_header(RATE_LIMIT_RESET, HeaderValue::from_static("not-a-number"));
        assert_eq!(policy.compute_delay(&mixed, 0, 0), Duration::from_secs(7));
    }

    #[test]
    fn reset_in_the_past_yields_zero() {
        let policy = RateLimitPolicy::default();
        let response = rate_limited(T0 + 10, &[T0]);
        assert_eq!(policy.compute_delay(&response, 1, 0), Duration::ZERO);
    }
}
