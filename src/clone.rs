//! Copy-on-retry support for request envelopes.

use bytes::Bytes;

use crate::envelope::{Body, RequestEnvelope};

/// Produces a structurally independent copy of `request` for the next attempt.
///
/// The body is copied into a fresh buffer so the already-dispatched request
/// and the new one never share read state. Headers are copied value by value
/// without being re-parsed, which keeps values that a strict constructor
/// would reject (e.g. pre-encoded ones).
pub fn clone_request(request: &RequestEnvelope) -> RequestEnvelope {
    let body = request.body.as_ref().map(|body| Body {
        data: Bytes::copy_from_slice(&body.data),
        headers: body.headers.clone(),
    });

    let mut headers = reqwest::header::HeaderMap::with_capacity(request.headers.len());
    for (name, value) in &request.headers {
        headers.append(name.clone(), value.clone());
    }

    RequestEnvelope {
        method: request.method.clone(),
        url: request.url.clone(),
        headers,
        body,
        version: request.version,
        metadata: request.metadata.clone(),
    }
}
