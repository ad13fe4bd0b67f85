//! Handler failures and their classification.
//!
//! Handlers return `Result<impl IntoResponse, impl Into<Failure>>`. Any error
//! type converts into a [`Failure`] with `?`, so handlers propagate whatever
//! their dependencies produce:
//!
//! ```rust,no_run
//! use tollgate::{Failure, InvalidArgument, Request, Response};
//!
//! async fn get_item(req: Request) -> Result<Response, Failure> {
//!     let id: i64 = req.param("id").unwrap_or("").parse()
//!         .map_err(|e| InvalidArgument::new("id must be an integer").param("id").with_source(e))?;
//!     if id <= 0 {
//!         return Err(Failure::invalid_argument("id must be positive"));
//!     }
//!     Ok(Response::json(format!(r#"{{"id":{id}}}"#).into_bytes()))
//! }
//! ```
//!
//! The request log classifies every failure into one of two kinds: an
//! [`InvalidArgument`] or an oversized request body anywhere in the error's
//! source chain is client input (400), everything else is unclassified (500).

use std::any::{Any, type_name};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt;

use crate::error::{BoxError, Error};

// ── InvalidArgument ───────────────────────────────────────────────────────────

/// The client-input error: the request carried an argument the handler
/// cannot accept.
///
/// Rendered as `"{message}"`, or `"{message} (Parameter '{name}')"` when a
/// parameter name is attached.
#[derive(Debug, thiserror::Error)]
#[error("{message}{}", parameter_suffix(.param))]
pub struct InvalidArgument {
    message: String,
    param: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl InvalidArgument {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), param: None, source: None }
    }

    /// Names the offending parameter.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.param = Some(name.into());
        self
    }

    /// Attaches the lower-level error that made the argument invalid.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn message(&self) -> &str { &self.message }
    pub fn param_name(&self) -> Option<&str> { self.param.as_deref() }
}

fn parameter_suffix(param: &Option<String>) -> String {
    match param {
        Some(name) => format!(" (Parameter '{name}')"),
        None => String::new(),
    }
}

// ── FailureKind ───────────────────────────────────────────────────────────────

/// The closed set of failure classes the error normalizer distinguishes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// Bad client input or an oversized body → `400 Bad Request`, no
    /// diagnostics exposed.
    ClientInput,
    /// Anything else → `500 Internal Server Error` with diagnostics.
    Unclassified,
}

// ── Failure ───────────────────────────────────────────────────────────────────

/// A failure raised by a downstream handler.
///
/// Keeps the original error, the name of its concrete type, and a backtrace
/// captured at the conversion point (honours `RUST_BACKTRACE`).
///
/// `Failure` does not implement [`std::error::Error`]: the blanket
/// `From<E: Error>` conversion below would otherwise overlap `From<Failure>`.
pub struct Failure {
    error: BoxError,
    type_name: &'static str,
    backtrace: Backtrace,
}

impl Failure {
    /// Shorthand for `Failure::from(InvalidArgument::new(message))`.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::from(InvalidArgument::new(message))
    }

    /// An unclassified failure carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::from(Message(message.into()))
    }

    /// Wraps an already type-erased error.
    pub fn from_boxed(error: BoxError) -> Self {
        Self { error, type_name: "dyn std::error::Error", backtrace: Backtrace::capture() }
    }

    /// Builds a failure from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_owned()
        };
        Self {
            error: Box::new(Message(format!("handler panicked: {message}"))),
            type_name: "panic",
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        let client_input = |e: &(dyn StdError + 'static)| {
            e.is::<InvalidArgument>()
                || matches!(e.downcast_ref::<Error>(), Some(Error::PayloadTooLarge(_)))
        };
        if self.chain().any(client_input) {
            FailureKind::ClientInput
        } else {
            FailureKind::Unclassified
        }
    }

    /// The top-level error's message.
    pub fn message(&self) -> String {
        self.error.to_string()
    }

    /// Name of the concrete error type the failure was built from.
    pub fn type_name(&self) -> &'static str { self.type_name }

    pub fn get_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.error.as_ref()
    }

    /// Returns the first error in the source chain of type `T`.
    pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
        self.chain().find_map(|e| e.downcast_ref::<T>())
    }

    /// The error followed by each of its sources, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &(dyn StdError + 'static)> {
        let head: &(dyn StdError + 'static) = self.error.as_ref();
        std::iter::successors(Some(head), |&e| e.source())
    }

    /// Full diagnostic text: type, message, every cause, and the backtrace
    /// when one was captured.
    pub fn details(&self) -> String {
        let mut out = format!("{}: {}", self.type_name, self.error);
        for cause in self.chain().skip(1) {
            out.push_str(&format!("\nCaused by: {cause}"));
        }
        if self.backtrace.status() == BacktraceStatus::Captured {
            out.push_str(&format!("\nStack trace:\n{}", self.backtrace));
        }
        out
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self { error: Box::new(error), type_name: type_name::<E>(), backtrace: Backtrace::capture() }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.details())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);
