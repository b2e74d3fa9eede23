use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockroom_infra::OperationError;

pub fn operation_error_to_response(err: OperationError) -> axum::response::Response {
    match err {
        OperationError::Rejected(rejections) => {
            tracing::debug!(%rejections, "request rejected");
            json_error(StatusCode::BAD_REQUEST, "validation_error", rejections.to_string())
        }
        OperationError::Conflict(detail) => {
            tracing::warn!(%detail, "transaction conflict");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "conflict",
                "concurrent update, retry the request",
            )
        }
        err @ (OperationError::Ledger(_) | OperationError::Invariant(_)) => {
            tracing::error!(error = %err, "operation failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path or body id, answering 400 `invalid_id` when malformed.
pub fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, axum::response::Response> {
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

pub fn body_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
}
