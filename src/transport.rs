use std::{io, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{error::TransportError, RequestEnvelope, ResponseEnvelope};

/// Sends a single request envelope and returns whatever the server answered.
///
/// Implementations must not retry on their own; any error they return is
/// propagated to the caller unchanged.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &RequestEnvelope,
        cancel: &CancellationToken,
    ) -> Result<ResponseEnvelope, TransportError>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn send(
        &self,
        request: &RequestEnvelope,
        cancel: &CancellationToken,
    ) -> Result<ResponseEnvelope, TransportError> {
        (**self).send(request, cancel).await
    }
}

/// [`Transport`] backed by a `reqwest::Client`.
///
/// The whole response body is buffered into the returned envelope.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// Wraps `http`, sharing its connection pool.
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            timeout: None,
        }
    }

    /// Sets a per-attempt timeout enforced by `reqwest`.
    ///
    /// This bounds a single exchange. The overall budget across retries is
    /// [`RetryConfig::request_timeout_secs`](crate::RetryConfig).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn build(&self, request: &RequestEnvelope) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(request.method().clone(), request.url().clone())
            .version(request.version())
            .headers(request.headers().clone());

        if let Some(body) = request.body() {
            builder = builder
                .headers(body.headers().clone())
                .body(body.data.clone());
        }

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        builder
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &RequestEnvelope,
        cancel: &CancellationToken,
    ) -> Result<ResponseEnvelope, TransportError> {
        let builder = self.build(request);
        let exchange = async move {
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(ResponseEnvelope::from_parts(status, headers, body))
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                Err(io::Error::new(io::ErrorKind::Interrupted, "request cancelled").into())
            }
            result = exchange => result.map_err(Into::into),
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::{
        header::{HeaderValue, CONTENT_TYPE},
        Method, Version,
    };

    use super::ReqwestTransport;
    use crate::{Body, RequestEnvelope};

    #[test]
    fn build_merges_request_and_content_headers() {
        let transport = ReqwestTransport::default();
        let request = RequestEnvelope::new(
            Method::POST,
            "https://example.okta.com/api/v1/users"
                .parse()
                .expect("valid url"),
        )
        .with_header(
            "x-okta-user-agent-extended".parse().expect("valid name"),
            HeaderValue::from_static("retry-test"),
        )
        .with_body(Body::new("{}").with_header(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ))
        .with_version(Version::HTTP_11);

        let built = transport
            .build(&request)
            .build()
            .expect("request must build");

        assert_eq!(built.method(), Method::POST);
        assert_eq!(
            built.headers().get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );
        assert!(built.headers().contains_key("x-okta-user-agent-extended"));
        assert_eq!(
            built.body().and_then(|b| b.as_bytes()),
            Some(&b"{}"[..])
        );
    }
}
