//! Incoming HTTP request type.
//!
//! The body arrives as a stream and stays one until something asks for it.
//! The first read collects it into memory; every later read (including the
//! request log's payload capture and the handler's own read) sees the same
//! bytes from the start. Collection stops at the body limit (2 MiB unless
//! the request log is configured otherwise).

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, Version};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use serde::de::DeserializeOwned;

use crate::error::{BoxError, Error};
use crate::failure::{Failure, InvalidArgument};
use crate::middleware::Endpoint;

type StreamBody = UnsyncBoxBody<Bytes, BoxError>;

/// Largest body collected into memory unless configured otherwise.
pub(crate) const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Request body state.
enum Body {
    /// Not read yet.
    Streaming(StreamBody),
    /// Fully collected; cheap to hand out again.
    Buffered(Bytes),
    /// Collecting failed; the cause is reported on every read.
    Failed(Arc<dyn std::error::Error + Send + Sync + 'static>),
    /// The body went past the limit and was abandoned.
    TooLarge(usize),
}

/// An incoming HTTP request.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
    body: Body,
    pub(crate) body_limit: usize,
    pub(crate) params: HashMap<String, String>,
    pub(crate) trace_id: String,
    pub(crate) endpoint: Option<Endpoint>,
}

impl Request {
    /// Converts a hyper request, assigning it `trace_id`.
    pub(crate) fn from_hyper<B>(req: http::Request<B>, trace_id: String) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body: Body::Streaming(body.map_err(Into::into).boxed_unsync()),
            body_limit: DEFAULT_BODY_LIMIT,
            params: HashMap::new(),
            trace_id,
            endpoint: None,
        }
    }

    /// Builder for requests constructed outside a server, e.g. in tests.
    pub fn builder() -> RequestBuilder {
        RequestBuilder {
            method: Method::GET,
            uri: Uri::from_static("/"),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            body_limit: DEFAULT_BODY_LIMIT,
            trace_id: None,
            endpoint: None,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    /// Unique identifier of this request, used to correlate its log lines.
    pub fn trace_id(&self) -> &str { &self.trace_id }

    /// Controller/action metadata of the matched route, if it has any.
    pub fn endpoint(&self) -> Option<&Endpoint> { self.endpoint.as_ref() }

    /// Header lookup. Returns `None` for absent or non-visible-ASCII values.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/items/{id}`, `req.param("id")` on `/items/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Whether the body has already been collected into memory.
    pub fn is_buffered(&self) -> bool {
        matches!(self.body, Body::Buffered(_))
    }

    /// Collects the body into memory if it is still streaming, and returns the
    /// full contents from the first byte.
    ///
    /// Calling this any number of times is fine: once buffered, the body is
    /// handed out again without touching the connection. A body longer than
    /// the limit fails with [`Error::PayloadTooLarge`], now and on every
    /// later read.
    pub async fn bytes(&mut self) -> Result<Bytes, Error> {
        let limit = self.body_limit;
        match &mut self.body {
            Body::Buffered(bytes) => Ok(bytes.clone()),
            Body::Failed(cause) => Err(Error::Body(Arc::clone(cause))),
            Body::TooLarge(limit) => Err(Error::PayloadTooLarge(*limit)),
            Body::Streaming(stream) => {
                // Boxed to erase the `&mut` body type from this future; otherwise
                // callers' futures fail a higher-ranked `From` check.
                let collect: std::pin::Pin<
                    Box<dyn std::future::Future<Output = Result<http_body_util::Collected<Bytes>, BoxError>> + Send + '_>,
                > = Box::pin(Limited::new(stream, limit).collect());
                match collect.await {
                    Ok(collected) => {
                        let bytes = collected.to_bytes();
                        self.body = Body::Buffered(bytes.clone());
                        Ok(bytes)
                    }
                    Err(e) if e.is::<LengthLimitError>() => {
                        self.body = Body::TooLarge(limit);
                        Err(Error::PayloadTooLarge(limit))
                    }
                    Err(e) => {
                        let cause: Arc<dyn std::error::Error + Send + Sync + 'static> = Arc::from(e);
                        self.body = Body::Failed(Arc::clone(&cause));
                        Err(Error::Body(cause))
                    }
                }
            }
        }
    }

    /// Reads the body as UTF-8 text. Invalid sequences are replaced with
    /// U+FFFD; a leading byte-order mark is kept as-is.
    pub async fn text(&mut self) -> Result<String, Error> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Deserializes a JSON body.
    ///
    /// Malformed JSON is the client's fault and fails as an
    /// [`InvalidArgument`]; a broken connection is an unclassified failure.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T, Failure> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            Failure::from(InvalidArgument::new(format!("malformed JSON body: {e}")).with_source(e))
        })
    }
}

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Fluent builder for [`Request`].
///
/// Obtain via [`Request::builder()`]. Defaults to `GET /` with no body. The
/// body is handed to the request as an unread stream, exactly as a server
/// would.
pub struct RequestBuilder {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    body_limit: usize,
    trace_id: Option<String>,
    endpoint: Option<Endpoint>,
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the request target. An unparsable target falls back to `/`.
    pub fn uri(mut self, uri: &str) -> Self {
        self.uri = uri.parse().unwrap_or_else(|_| Uri::from_static("/"));
        self
    }

    /// Appends a header. Invalid names or values are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Largest body [`Request::bytes`] will collect.
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Pre-resolves endpoint metadata, as routing would.
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn build(self) -> Request {
        let stream = Full::new(self.body)
            .map_err(|never| match never {})
            .boxed_unsync();
        Request {
            method: self.method,
            uri: self.uri,
            version: Version::HTTP_11,
            headers: self.headers,
            body: Body::Streaming(stream),
            body_limit: self.body_limit,
            params: HashMap::new(),
            trace_id: self.trace_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            endpoint: self.endpoint,
        }
    }
}
