//! Failure → JSON error response.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::event::EventIdentity;
use crate::failure::{Failure, FailureKind};
use crate::response::{IntoResponse, Response};

/// Wire format of every error the request log writes.
///
/// ```json
/// { "statusCode": 400, "message": "Invalid argument: id must be positive", "errorDetails": null }
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,
    pub message: String,
    pub error_details: Option<String>,
}

impl ErrorResponse {
    /// Classifies `failure`. Client input keeps its message and hides
    /// diagnostics; everything else gets a generic message plus diagnostics.
    pub fn from_failure(failure: &Failure) -> Self {
        match failure.kind() {
            FailureKind::ClientInput => Self {
                status_code: StatusCode::BAD_REQUEST.as_u16(),
                message: format!("Invalid argument: {}", failure.message()),
                error_details: None,
            },
            FailureKind::Unclassified => Self {
                status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                message: "Internal server error".to_owned(),
                error_details: Some(failure.details()),
            },
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match serde_json::to_vec(&self) {
            Ok(body) => Response::builder().status(status).json(body),
            Err(e) => {
                warn!(error = %e, "error response could not be serialized, sending bare status");
                Response::status(status)
            }
        }
    }
}

/// Logs `failure` and builds the response that replaces whatever the handler
/// would have produced.
pub(crate) fn normalize(failure: &Failure, event: &EventIdentity, trace_id: &str) -> Response {
    error!(
        event_id = event.id,
        event_name = %event.name,
        kind = ?failure.kind(),
        "The request {trace_id}: throws a Exception {}",
        failure.message(),
    );
    ErrorResponse::from_failure(failure).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::InvalidArgument;
    use crate::test_support::LogCapture;

    #[test]
    fn invalid_argument_maps_to_400_without_details() {
        let res = ErrorResponse::from_failure(&Failure::invalid_argument("id must be positive"));
        assert_eq!(res, ErrorResponse {
            status_code: 400,
            message: "Invalid argument: id must be positive".into(),
            error_details: None,
        });
    }

    #[test]
    fn other_failures_map_to_500_with_details() {
        let res = ErrorResponse::from_failure(&Failure::msg("database unreachable"));
        assert_eq!(res.status_code, 500);
        assert_eq!(res.message, "Internal server error");
        assert!(res.error_details.unwrap().contains("database unreachable"));
    }

    #[test]
    fn serializes_null_details_explicitly() {
        let body = serde_json::to_string(&ErrorResponse::from_failure(
            &InvalidArgument::new("id must be positive").into(),
        ))
        .unwrap();
        assert_eq!(
            body,
            r#"{"statusCode":400,"message":"Invalid argument: id must be positive","errorDetails":null}"#
        );
    }

    #[test]
    fn normalize_logs_and_writes_json() {
        let (logs, _guard) = LogCapture::install();
        let res = normalize(
            &Failure::invalid_argument("bad"),
            &EventIdentity::new(1, "Items_Get"),
            "t-9",
        );

        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(logs.messages(), vec!["The request t-9: throws a Exception bad"]);
    }
}
