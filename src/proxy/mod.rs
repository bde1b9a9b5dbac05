use std::sync::Arc;

use axum::routing::{any, post};
use axum::Router;

use crate::errors::AppError;
use crate::models::service::ServiceKind;
use crate::AppState;

pub mod auth;
pub mod chat;
pub mod handler;
pub mod txt2img;
pub mod upstream;

/// Forwarding endpoints. The caller mounts this under `/api/v1`.
pub fn proxy_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/proxy/*path", any(handler::passthrough))
        .route("/chat/completions", post(chat::completions))
        .route("/sd/txt2img", post(txt2img::txt2img))
}

/// Look up the base URL the forwarder should hit for `kind`.
/// Missing admin configuration is a 503, distinct from upstream failures.
pub(crate) async fn resolve_active_url(
    state: &AppState,
    kind: ServiceKind,
) -> Result<String, AppError> {
    state
        .store
        .resolve_active_service(kind)
        .await
        .map_err(AppError::Internal)?
        .map(|svc| svc.base_url.trim_end_matches('/').to_string())
        .ok_or(AppError::ServiceNotConfigured(kind.as_str()))
}

/// Drain an upstream response: non-2xx becomes a wrapped `Upstream` error
/// carrying the backend's status and body; 2xx must parse as JSON.
pub(crate) async fn read_upstream_json(
    resp: reqwest::Response,
) -> Result<(axum::http::StatusCode, serde_json::Value), AppError> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| AppError::Transport(format!("failed to read upstream body: {e}")))?;

    if !status.is_success() {
        return Err(AppError::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    let value = serde_json::from_str(&body).map_err(|e| {
        AppError::Internal(anyhow::anyhow!("upstream returned a non-JSON body: {e}"))
    })?;
    let status =
        axum::http::StatusCode::from_u16(status.as_u16()).unwrap_or(axum::http::StatusCode::OK);
    Ok((status, value))
}
