//! Middleware layer.
//!
//! Middleware intercepts a request on its way to the handler and the outcome
//! on its way back. Every router runs the built-in [`RequestLog`] as its
//! outermost link; anything added with [`Router::layer`](crate::Router::layer)
//! runs inside it, in registration order.
//!
//! ```rust,no_run
//! use tollgate::{BoxFuture, HandlerResult, Request};
//! use tollgate::middleware::{Middleware, Next};
//!
//! struct RequireJson;
//!
//! impl Middleware for RequireJson {
//!     fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a, HandlerResult> {
//!         Box::pin(async move {
//!             if req.header("content-type") != Some("application/json") {
//!                 return Err(tollgate::Failure::invalid_argument("expected a JSON body"));
//!             }
//!             next.run(req).await
//!         })
//!     }
//! }
//! ```

mod event;
mod normalize;
mod payload;
mod request_log;
mod timing;

use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, HandlerResult};
use crate::request::Request;

pub use event::{Endpoint, EventIdentity, EventTable};
pub use normalize::ErrorResponse;
pub use request_log::RequestLog;
pub use timing::Elapsed;

/// A link in the request pipeline.
pub trait Middleware: Send + Sync + 'static {
    /// Processes `req`, usually by awaiting `next.run(req)` somewhere inside.
    fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a, HandlerResult>;
}

pub(crate) type Layers = Arc<Vec<Arc<dyn Middleware>>>;

/// The rest of the pipeline: remaining middleware, then the route handler.
pub struct Next {
    handler: BoxedHandler,
    layers: Layers,
    index: usize,
}

impl Next {
    pub(crate) fn new(handler: BoxedHandler, layers: Layers) -> Self {
        Self { handler, layers, index: 0 }
    }

    /// Runs the remaining pipeline exactly once.
    pub fn run(self, req: Request) -> BoxFuture<'static, HandlerResult> {
        match self.layers.get(self.index).cloned() {
            Some(layer) => {
                let next = Next { handler: self.handler, layers: self.layers, index: self.index + 1 };
                Box::pin(async move { layer.handle(req, next).await })
            }
            None => self.handler.call(req),
        }
    }
}
