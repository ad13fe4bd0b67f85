//! Request payload capture for mutating methods.

use http::Method;
use tracing::{info, warn};

use super::event::EventIdentity;
use crate::request::Request;

/// Longest payload logged verbatim; anything past it is cut.
pub(crate) const DEFAULT_LOG_LIMIT: usize = 16 * 1024;

/// Whether requests with this method have their payload logged.
///
/// Exact, case-sensitive match on the method token.
pub(crate) fn is_captured(method: &Method) -> bool {
    matches!(method.as_str(), "POST" | "PUT" | "PATCH")
}

/// Buffers the body, logs at most `log_limit` bytes of it as UTF-8 text, and
/// leaves it readable from the start for the handler.
///
/// A body that cannot be read (broken or over the body limit) is logged as a
/// warning and not retried; the handler sees the same error when it asks for
/// the body.
pub(crate) async fn capture(req: &mut Request, event: &EventIdentity, log_limit: usize) {
    match req.text().await {
        Ok(payload) => {
            let shown = truncate(&payload, log_limit);
            if shown.len() < payload.len() {
                info!(
                    event_id = event.id,
                    event_name = %event.name,
                    payload_len = payload.len(),
                    "Payload: {shown}... (truncated)",
                );
            } else {
                info!(event_id = event.id, event_name = %event.name, "Payload: {payload}");
            }
        }
        Err(e) => {
            warn!(event_id = event.id, event_name = %event.name, error = %e, "payload could not be buffered");
        }
    }
}

/// Longest prefix of `text` no longer than `max` bytes that ends on a char
/// boundary.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let end = (0..=max).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
    &text[..end]
}
