//! Infrastructure error type.

use std::sync::Arc;

/// Boxed error used wherever a body or transport error type is erased.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by tollgate's fallible infrastructure operations.
///
/// Application-level failures raised by handlers are [`Failure`](crate::Failure)s,
/// not `Error`s. This type surfaces binding, accepting and body-transport
/// problems.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    /// Reading the request body from the connection failed. The cause is
    /// shared so that every later read of the same body reports it again.
    #[error("failed to read request body")]
    Body(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// The request body is longer than the configured limit, in bytes.
    /// Handlers that propagate it answer `400`.
    #[error("request body exceeds the {0}-byte limit")]
    PayloadTooLarge(usize),
}
