use std::collections::BTreeMap;

use bytes::{buf::Reader, Buf, Bytes};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method, StatusCode, Url, Version,
};

/// Request-scoped bookkeeping carried alongside an envelope.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Buffered request body together with its content-level headers.
#[derive(Debug, Default)]
pub struct Body {
    pub(crate) data: Bytes,
    pub(crate) headers: HeaderMap,
}

impl Body {
    /// Creates a body from in-memory bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Appends a content-level header such as `Content-Type`.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Returns the content-level headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the content-level headers for modification.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns the buffered bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the body length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` when the body has no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a reader positioned at the start of the body.
    ///
    /// Every call yields an independent cursor, so reading one never
    /// exhausts another.
    pub fn reader(&self) -> Reader<Bytes> {
        self.data.clone().reader()
    }
}

/// Outbound request as seen by the retry engine.
#[derive(Debug)]
pub struct RequestEnvelope {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<Body>,
    pub(crate) version: Version,
    pub(crate) metadata: Metadata,
}

impl RequestEnvelope {
    /// Creates a body-less HTTP/1.1 request.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            version: Version::HTTP_11,
            metadata: Metadata::new(),
        }
    }

    /// Creates a `GET` request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a `POST` request carrying `body`.
    pub fn post(url: Url, body: Body) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    /// Appends a header, keeping any existing values for the same name.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the body, replacing any previous one.
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the HTTP version.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Inserts a metadata entry. Metadata is never sent over the wire.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the request headers for modification.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns the body, if any.
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Returns the HTTP version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the request metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the request metadata for modification.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// Response returned by a transport. The engine only inspects the status
/// and headers.
#[derive(Debug)]
pub struct ResponseEnvelope {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ResponseEnvelope {
    /// Creates an empty response with `status`.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Builds a response from parts already collected by a transport.
    pub fn from_parts(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Appends a header, keeping any existing values for the same name.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the response body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the buffered body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consumes the response and returns its body.
    pub fn into_body(self) -> Bytes {
        self.body
    }
}
