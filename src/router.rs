//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. A route may carry
//! [`Endpoint`] metadata (controller and action names) that the request log
//! turns into an event identity.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{Endpoint, Layers, Middleware, Next, RequestLog};
use crate::request::Request;
use crate::response::Response;

#[derive(Clone)]
struct Route {
    handler: BoxedHandler,
    endpoint: Option<Endpoint>,
}

/// The application router.
///
/// Build it once at startup and pass it to [`Server::serve`](crate::Server::serve).
/// Every registration returns `self` so calls chain naturally.
///
/// ```rust,no_run
/// # use tollgate::{Endpoint, Failure, Method, Request, Response, Router};
/// # async fn get_item(_: Request) -> Result<Response, Failure> { Ok(Response::text("")) }
/// # async fn create_item(_: Request) -> Result<Response, Failure> { Ok(Response::text("")) }
/// # async fn ping(_: Request) -> Result<Response, Failure> { Ok(Response::text("")) }
/// Router::new()
///     .action(Method::GET,  "/items/{id}", Endpoint::new("Items", "Get"),    get_item)
///     .action(Method::POST, "/items",      Endpoint::new("Items", "Create"), create_item)
///     .on(Method::GET, "/ping", ping);
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
    layers: Layers,
    log: RequestLog,
    not_found: BoxedHandler,
    method_not_allowed: BoxedHandler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            layers: Layers::default(),
            log: RequestLog::default(),
            not_found: not_found.into_boxed_handler(),
            method_not_allowed: method_not_allowed.into_boxed_handler(),
        }
    }

    /// Registers a handler without endpoint metadata. Its requests log under
    /// the unmapped identity `"_"`.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with an existing one.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, None, handler)
    }

    /// Registers a handler for a controller action.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with an existing one.
    pub fn action(self, method: Method, path: &str, endpoint: Endpoint, handler: impl Handler) -> Self {
        self.add(method, path, Some(endpoint), handler)
    }

    /// Replaces the request log configuration.
    pub fn request_log(mut self, log: RequestLog) -> Self {
        self.log = log;
        self
    }

    /// Adds middleware that runs inside the request log, after any added
    /// before it.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        Arc::make_mut(&mut self.layers).push(Arc::new(middleware));
        self
    }

    fn add(mut self, method: Method, path: &str, endpoint: Option<Endpoint>, handler: impl Handler) -> Self {
        let route = Route { handler: handler.into_boxed_handler(), endpoint };
        self.routes
            .entry(method)
            .or_default()
            .insert(path, route)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Routes `req` through the request log, any extra middleware and the
    /// matching handler. Unmatched requests get `404`, or `405` when the path
    /// exists under another method.
    pub async fn handle(&self, mut req: Request) -> Response {
        let handler = match self.lookup(&req.method, req.uri.path()) {
            Some((route, params)) => {
                req.params = params;
                req.endpoint = route.endpoint.clone();
                Arc::clone(&route.handler)
            }
            None if self.path_exists(req.uri.path()) => Arc::clone(&self.method_not_allowed),
            None => Arc::clone(&self.not_found),
        };
        self.log.run(req, Next::new(handler, Arc::clone(&self.layers))).await
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(&Route, HashMap<String, String>)> {
        let matched = self.routes.get(method)?.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value, params))
    }

    fn path_exists(&self, path: &str) -> bool {
        self.routes.values().any(|tree| tree.at(path).is_ok())
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

async fn not_found(_req: Request) -> Result<StatusCode, Infallible> {
    Ok(StatusCode::NOT_FOUND)
}

async fn method_not_allowed(_req: Request) -> Result<StatusCode, Infallible> {
    Ok(StatusCode::METHOD_NOT_ALLOWED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::Failure;
    use crate::handler::{BoxFuture, HandlerResult};
    use crate::middleware::EventTable;
    use crate::test_support::LogCapture;

    async fn get_item(req: Request) -> Result<Response, Failure> {
        let id = req.param("id").unwrap_or("?");
        let controller = req.endpoint().map(Endpoint::controller).unwrap_or("");
        Ok(Response::text(format!("{controller}:{id}")))
    }

    fn router() -> Router {
        Router::new()
            .action(Method::GET, "/items/{id}", Endpoint::new("Items", "Get"), get_item)
            .request_log(RequestLog::new(EventTable::new().with("Items", "Get", 5)))
    }

    #[tokio::test]
    async fn matches_params_and_endpoint() {
        let (logs, _guard) = LogCapture::install();
        let res = router().handle(Request::builder().uri("/items/42").build()).await;

        assert_eq!(res.body(), b"Items:42");
        let status = logs.events().into_iter()
            .find(|e| e.message.starts_with("Status Code Response"))
            .unwrap();
        assert_eq!(status.field("event_id"), Some("5"));
    }

    #[tokio::test]
    async fn unknown_path_is_404_and_still_logged() {
        let (logs, _guard) = LogCapture::install();
        let res = router().handle(Request::builder().uri("/nope").build()).await;

        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert!(logs.messages().contains(&"Status Code Response: 404".to_owned()));
    }

    #[tokio::test]
    async fn wrong_method_is_405() {
        let req = Request::builder().method(Method::DELETE).uri("/items/1").build();
        let res = router().handle(req).await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    struct Reject;

    impl Middleware for Reject {
        fn handle<'a>(&'a self, _req: Request, _next: Next) -> BoxFuture<'a, HandlerResult> {
            Box::pin(async { Err(Failure::invalid_argument("rejected by layer")) })
        }
    }

    #[tokio::test]
    async fn layer_failures_are_normalized_by_the_request_log() {
        let res = router().layer(Reject).handle(Request::builder().uri("/items/1").build()).await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert!(std::str::from_utf8(res.body()).unwrap().contains("rejected by layer"));
    }

    #[tokio::test]
    async fn unrouted_post_body_is_bounded() {
        let (logs, _guard) = LogCapture::install();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/nope")
            .body(vec![b'x'; 64 * 1024])
            .build();

        let res = Router::new()
            .request_log(RequestLog::default().body_limit(1024))
            .handle(req)
            .await;

        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        let messages = logs.messages();
        assert!(!messages.iter().any(|m| m.starts_with("Payload:")));
        assert!(messages.iter().all(|m| m.len() < 1024));
    }
}
