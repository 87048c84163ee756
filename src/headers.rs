//! Header names read and written by the retry engine, and retry provenance
//! stamping.

use reqwest::header::{HeaderName, HeaderValue};

use crate::envelope::RequestEnvelope;

/// Server-assigned identifier of a request, used as an opaque correlation token.
pub const REQUEST_ID: HeaderName = HeaderName::from_static("x-okta-request-id");

/// Identifier of the first rate-limited request of a retry chain.
pub const RETRY_FOR: HeaderName = HeaderName::from_static("x-okta-retry-for");

/// Attempt number of the retried request.
pub const RETRY_COUNT: HeaderName = HeaderName::from_static("x-okta-retry-count");

/// Unix timestamp (seconds) at which the current rate limit window resets.
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-rate-limit-reset");

/// Records retry provenance on a freshly cloned request.
///
/// `RETRY_FOR` is only set when absent, so it keeps pointing at the first
/// failure of the chain. `RETRY_COUNT` is replaced on every call.
pub fn annotate_retry(
    mut request: RequestEnvelope,
    originating_request_id: Option<&HeaderValue>,
    attempt: u32,
) -> RequestEnvelope {
    if let Some(request_id) = originating_request_id {
        if !request.headers.contains_key(RETRY_FOR) {
            request.headers.insert(RETRY_FOR, request_id.clone());
        }
    }

    request
        .headers
        .insert(RETRY_COUNT, HeaderValue::from(attempt));
    request
}
