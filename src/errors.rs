use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing/malformed Authorization header, unknown token, or revoked
    /// token. One variant on purpose: the client must not be able to tell
    /// which case it hit.
    #[error("unauthorized")]
    Unauthorized,

    #[error("no active {0} service configured")]
    ServiceNotConfigured(&'static str),

    #[error("invalid JSON in request body: {0}")]
    InvalidJson(String),

    #[error("request body failed validation")]
    Validation(serde_json::Value),

    #[error("upstream returned {status}")]
    Upstream { status: u16, body: String },

    #[error("upstream unreachable: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Unauthorized: invalid or missing API key" }),
            ),
            AppError::ServiceNotConfigured(kind) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "Service not configured",
                    "details": format!(
                        "No active {kind} service configuration found. Configure one in the Services tab."
                    ),
                }),
            ),
            AppError::InvalidJson(detail) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid JSON in request body", "details": detail }),
            ),
            AppError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid request body", "details": details }),
            ),
            AppError::Upstream { status, body } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                json!({ "error": "Error from upstream service", "details": body }),
            ),
            AppError::Transport(detail) => {
                tracing::error!("upstream transport failure: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Upstream request failed", "details": detail }),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "An unexpected internal error occurred" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
