//! # tollgate
//!
//! A minimal HTTP host for services behind a reverse proxy, with one thing
//! every request passes through: the request log.
//!
//! ## What the request log does
//!
//! - Resolves an **event identity** from the route's controller/action names,
//!   so all log lines of one action share an id.
//! - Logs the **payload** of `POST`/`PUT`/`PATCH` requests while leaving the
//!   body readable by the handler.
//! - **Times** the handler and logs the elapsed time and final status.
//! - **Normalizes failures**: any error (or panic) from a handler becomes a
//!   JSON body `{ "statusCode", "message", "errorDetails" }`. An
//!   [`InvalidArgument`] is a `400`; everything else is a `500` with
//!   diagnostics.
//!
//! Logging goes through [`tracing`]; install whatever subscriber you like.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tollgate::{Endpoint, Failure, Method, Request, Response, Router, Server, StatusCode};
//! use tollgate::middleware::{EventTable, RequestLog};
//!
//! #[tokio::main]
//! async fn main() {
//!     let events = EventTable::new()
//!         .with("Items", "Get", 1)
//!         .with("Items", "Create", 2);
//!
//!     let app = Router::new()
//!         .action(Method::GET,  "/items/{id}", Endpoint::new("Items", "Get"),    get_item)
//!         .action(Method::POST, "/items",      Endpoint::new("Items", "Create"), create_item)
//!         .request_log(RequestLog::new(events));
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn get_item(req: Request) -> Result<Response, Failure> {
//!     let id: u64 = req.param("id").unwrap_or("").parse()
//!         .map_err(|_| Failure::invalid_argument("id must be a positive integer"))?;
//!     Ok(Response::json(format!(r#"{{"id":{id}}}"#).into_bytes()))
//! }
//!
//! async fn create_item(mut req: Request) -> Result<Response, Failure> {
//!     let body = req.bytes().await?;
//!     Ok(Response::builder()
//!         .status(StatusCode::CREATED)
//!         .header("location", "/items/99")
//!         .json(body))
//! }
//! ```

mod error;
mod failure;
mod handler;
mod request;
mod response;
mod router;
mod server;

#[cfg(test)]
mod test_support;

pub mod middleware;

pub use error::{BoxError, Error};
pub use failure::{Failure, FailureKind, InvalidArgument};
pub use handler::{BoxFuture, Handler, HandlerResult};
pub use http::{Method, StatusCode};
pub use middleware::{Endpoint, ErrorResponse};
pub use request::{Request, RequestBuilder};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::{Server, TRACE_HEADER};
