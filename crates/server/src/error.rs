use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use taxcase_core::errors::{CoreError, ErrorKind};

/// Transport-level error envelope. Every failure maps to a structured
/// `{kind, message}` body; internal details stay in the logs.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    Core(CoreError),
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        Self::Core(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            Self::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", message)
            }
            Self::Core(error) => {
                let status = match error.kind() {
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::Conflict => StatusCode::CONFLICT,
                    ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
                    ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let message = if error.kind() == ErrorKind::Internal {
                    tracing::error!(%error, "internal failure surfaced to transport");
                    "an unexpected internal error occurred".to_string()
                } else {
                    error.to_string()
                };
                (status, error.kind().as_str(), message)
            }
        };

        (status, Json(json!({ "kind": kind, "message": message }))).into_response()
    }
}
