//! The request log: the outermost link of every pipeline.
//!
//! For each request, in order:
//!
//! 1. resolve the [`EventIdentity`] from the route's endpoint metadata,
//! 2. cap the body and log the payload of `POST`/`PUT`/`PATCH` requests,
//! 3. time the rest of the pipeline,
//! 4. log timing and status, or normalize a failure into an
//!    [`ErrorResponse`](super::ErrorResponse).
//!
//! All lines for one request share an `info_span!("request")` carrying the
//! trace id, method and path.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{Instrument, debug, info, info_span};

use super::event::EventTable;
use super::timing::Stopwatch;
use super::{Middleware, Next, normalize, payload};
use crate::failure::Failure;
use crate::handler::{BoxFuture, HandlerResult};
use crate::request::{DEFAULT_BODY_LIMIT, Request};
use crate::response::Response;

/// Request logging and error normalization.
///
/// ```rust
/// use tollgate::middleware::{EventTable, RequestLog};
///
/// let log = RequestLog::new(EventTable::new().with("Items", "Create", 10))
///     .capture_payload(true)
///     .body_limit(512 * 1024)
///     .payload_log_limit(4 * 1024);
/// ```
#[derive(Clone, Debug)]
pub struct RequestLog {
    events: Arc<EventTable>,
    capture_payload: bool,
    body_limit: usize,
    payload_log_limit: usize,
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new(EventTable::default())
    }
}

impl RequestLog {
    pub fn new(events: EventTable) -> Self {
        Self {
            events: Arc::new(events),
            capture_payload: true,
            body_limit: DEFAULT_BODY_LIMIT,
            payload_log_limit: payload::DEFAULT_LOG_LIMIT,
        }
    }

    /// Whether `POST`/`PUT`/`PATCH` payloads are logged. On by default.
    pub fn capture_payload(mut self, enabled: bool) -> Self {
        self.capture_payload = enabled;
        self
    }

    /// Largest request body, in bytes, read into memory for capture or for
    /// the handler. Longer bodies fail with
    /// [`Error::PayloadTooLarge`](crate::Error::PayloadTooLarge). 2 MiB by
    /// default.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Longest payload, in bytes, written to the log before it is cut.
    /// 16 KiB by default.
    pub fn payload_log_limit(mut self, bytes: usize) -> Self {
        self.payload_log_limit = bytes;
        self
    }

    pub fn events(&self) -> &EventTable { &self.events }

    /// Runs `next` for `req` and always produces a response.
    pub async fn run(&self, req: Request, next: Next) -> Response {
        let span = info_span!(
            "request",
            trace_id = %req.trace_id(),
            method = %req.method(),
            path = %req.path(),
        );
        self.process(req, next).instrument(span).await
    }

    async fn process(&self, mut req: Request, next: Next) -> Response {
        let event = self.events.resolve(req.endpoint());
        let trace_id = req.trace_id().to_owned();

        debug!(
            event_id = event.id,
            event_name = %event.name,
            protocol = protocol(&req),
            host = req.header("host").or_else(|| req.uri().host()).unwrap_or(""),
            user_agent = req.header("user-agent").unwrap_or(""),
            "request started",
        );

        req.body_limit = self.body_limit;
        if self.capture_payload && payload::is_captured(req.method()) {
            payload::capture(&mut req, &event, self.payload_log_limit).await;
        }

        let stopwatch = Stopwatch::start(trace_id.clone(), event.clone());
        let outcome = AssertUnwindSafe(next.run(req))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Failure::from_panic(panic)));
        let elapsed = stopwatch.stop();

        info!(event_id = event.id, event_name = %event.name, "The request {trace_id} took {elapsed}");

        let response = match outcome {
            Ok(response) => {
                info!(
                    event_id = event.id,
                    event_name = %event.name,
                    "Status Code Response: {}",
                    response.status_code().as_u16(),
                );
                response
            }
            Err(failure) => normalize::normalize(&failure, &event, &trace_id),
        };

        debug!(event_id = event.id, event_name = %event.name, "request finished");
        response
    }
}

impl Middleware for RequestLog {
    fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move { Ok(self.run(req, next).await) })
    }
}

/// Scheme the client used, trusting the proxy's `x-forwarded-proto` first.
fn protocol(req: &Request) -> &str {
    req.header("x-forwarded-proto")
        .or_else(|| req.uri().scheme_str())
        .unwrap_or("http")
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode};

    use super::*;
    use crate::handler::Handler;
    use crate::middleware::{Endpoint, ErrorResponse, Layers};
    use crate::test_support::LogCapture;
    use crate::{InvalidArgument, Response};

    fn next(handler: impl Handler) -> Next {
        Next::new(handler.into_boxed_handler(), Layers::default())
    }

    fn log() -> RequestLog {
        RequestLog::new(EventTable::new().with("Items", "Create", 10).with("Items", "Update", 11))
    }

    async fn created(mut req: Request) -> Result<Response, Failure> {
        let body = req.bytes().await?;
        assert_eq!(&body[..], br#"{"name":"x"}"#);
        Ok(Response::builder().status(StatusCode::CREATED).json(body))
    }

    async fn rejects_id(_req: Request) -> Result<Response, InvalidArgument> {
        Err(InvalidArgument::new("id must be positive"))
    }

    async fn breaks(_req: Request) -> Result<Response, std::io::Error> {
        Err(std::io::Error::other("disk on fire"))
    }

    async fn panics(_req: Request) -> Result<Response, Failure> {
        panic!("unexpected state")
    }

    async fn echo_body(mut req: Request) -> Result<Response, Failure> {
        Ok(Response::json(req.bytes().await?))
    }

    async fn echo_buffered(req: Request) -> Result<Response, Failure> {
        Ok(Response::text(if req.is_buffered() { "buffered" } else { "streaming" }))
    }

    fn parse(res: &Response) -> ErrorResponse {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[tokio::test]
    async fn successful_post_logs_payload_timing_and_status() {
        let (logs, _guard) = LogCapture::install();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/items")
            .trace_id("t-1")
            .endpoint(Endpoint::new("Items", "Create"))
            .body(r#"{"name":"x"}"#)
            .build();

        let res = log().run(req, next(created)).await;

        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.body(), br#"{"name":"x"}"#);

        let info: Vec<_> = logs.events().into_iter()
            .filter(|e| e.level == tracing::Level::INFO)
            .collect();
        assert_eq!(info.len(), 3);
        assert_eq!(info[0].message, r#"Payload: {"name":"x"}"#);
        assert!(info[1].message.starts_with("The request t-1 took 00:00:"));
        assert_eq!(info[2].message, "Status Code Response: 201");
        for event in &info {
            assert_eq!(event.field("event_id"), Some("10"));
            assert_eq!(event.field("event_name"), Some("Items_Create"));
        }
    }

    #[tokio::test]
    async fn invalid_argument_becomes_400() {
        let (logs, _guard) = LogCapture::install();
        let req = Request::builder()
            .method(Method::PUT)
            .uri("/items/1")
            .trace_id("t-2")
            .endpoint(Endpoint::new("Items", "Update"))
            .body("{}")
            .build();

        let res = log().run(req, next(rejects_id)).await;

        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(
            res.body(),
            br#"{"statusCode":400,"message":"Invalid argument: id must be positive","errorDetails":null}"#
        );

        let messages = logs.messages();
        let took = messages.iter().position(|m| m.starts_with("The request t-2 took ")).unwrap();
        let threw = messages.iter()
            .position(|m| m == "The request t-2: throws a Exception id must be positive")
            .unwrap();
        assert!(took < threw);
        assert!(!messages.iter().any(|m| m.starts_with("Status Code Response")));
    }

    #[tokio::test]
    async fn other_failures_become_500_with_details() {
        let (_logs, _guard) = LogCapture::install();
        let req = Request::builder().uri("/items/99").build();

        let res = log().run(req, next(breaks)).await;

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = parse(&res);
        assert_eq!(body.status_code, 500);
        assert_eq!(body.message, "Internal server error");
        let details = body.error_details.unwrap();
        assert!(details.contains("disk on fire"));
        assert!(details.contains("std::io"));
    }

    #[tokio::test]
    async fn panics_become_500() {
        let (logs, _guard) = LogCapture::install();
        let res = log().run(Request::builder().trace_id("t-3").build(), next(panics)).await;

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(parse(&res).error_details.unwrap().contains("unexpected state"));
        assert!(logs.messages().iter().any(|m| m.starts_with("The request t-3 took ")));
    }

    #[tokio::test]
    async fn reads_are_not_captured() {
        for method in [Method::GET, Method::DELETE, Method::HEAD, Method::OPTIONS] {
            let (logs, _guard) = LogCapture::install();
            let req = Request::builder().method(method).body("ignored").build();

            let res = log().run(req, next(echo_buffered)).await;

            assert_eq!(res.body(), b"streaming");
            assert!(!logs.messages().iter().any(|m| m.starts_with("Payload:")));
        }
    }

    #[tokio::test]
    async fn capture_can_be_disabled() {
        let (logs, _guard) = LogCapture::install();
        let req = Request::builder().method(Method::POST).body("secret").build();

        let res = log().capture_payload(false).run(req, next(echo_buffered)).await;

        assert_eq!(res.body(), b"streaming");
        assert!(!logs.messages().iter().any(|m| m.starts_with("Payload:")));
    }

    #[tokio::test]
    async fn routes_without_metadata_log_the_sentinel() {
        let (logs, _guard) = LogCapture::install();
        log().run(Request::builder().build(), next(echo_buffered)).await;

        let status = logs.events().into_iter()
            .find(|e| e.message.starts_with("Status Code Response"))
            .unwrap();
        assert_eq!(status.field("event_id"), Some("-1"));
        assert_eq!(status.field("event_name"), Some("_"));
    }

    #[tokio::test]
    async fn status_reflects_the_handler() {
        async fn no_content(_req: Request) -> Result<StatusCode, Failure> {
            Ok(StatusCode::NO_CONTENT)
        }

        let (logs, _guard) = LogCapture::install();
        let res = log().run(Request::builder().method(Method::DELETE).build(), next(no_content)).await;

        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
        assert!(logs.messages().contains(&"Status Code Response: 204".to_owned()));
    }

    #[tokio::test]
    async fn put_and_patch_handlers_see_the_whole_body() {
        let sent = r#"{"name":"y","tags":["a","b"]}"#;
        for method in [Method::PUT, Method::PATCH] {
            let (logs, _guard) = LogCapture::install();
            let req = Request::builder()
                .method(method.clone())
                .uri("/items/1")
                .endpoint(Endpoint::new("Items", "Update"))
                .body(sent)
                .build();

            let res = log().run(req, next(echo_body)).await;

            assert_eq!(res.status_code(), StatusCode::OK, "{method}");
            assert_eq!(res.body(), sent.as_bytes(), "{method}");
            assert!(logs.messages().contains(&format!("Payload: {sent}")), "{method}");
        }
    }

    #[tokio::test]
    async fn oversized_body_is_refused_with_400() {
        let (logs, _guard) = LogCapture::install();
        let req = Request::builder()
            .method(Method::POST)
            .trace_id("t-4")
            .body(vec![b'x'; 64])
            .build();

        let res = log().body_limit(16).run(req, next(echo_body)).await;

        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            parse(&res).message,
            "Invalid argument: request body exceeds the 16-byte limit"
        );
        assert!(!logs.messages().iter().any(|m| m.starts_with("Payload:")));
    }

    #[tokio::test]
    async fn logged_payload_is_cut_at_the_log_limit() {
        let (logs, _guard) = LogCapture::install();
        let req = Request::builder().method(Method::POST).body("abcdefghij").build();

        let res = log().payload_log_limit(4).run(req, next(echo_body)).await;

        assert_eq!(res.body(), b"abcdefghij");
        assert!(logs.messages().contains(&"Payload: abcd... (truncated)".to_owned()));
    }
}
