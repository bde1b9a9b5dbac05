use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{delete, get};
use axum::Router;

use crate::errors::AppError;
use crate::AppState;

pub mod handlers;

/// Admin data API consumed by the dashboard.
/// All routes are relative — the caller mounts this under `/api/v1`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/keys",
            get(handlers::list_keys)
                .post(handlers::create_key)
                .put(handlers::update_key),
        )
        .route("/keys/:id", delete(handlers::delete_key))
        .route(
            "/services",
            get(handlers::list_services)
                .post(handlers::create_service)
                .put(handlers::update_service),
        )
        .route("/metrics", get(handlers::list_metrics))
        .route("/connections", get(handlers::recent_connections))
}

/// Same-origin referer comparison gating admin mutations.
///
/// This is a CSRF speed bump kept for parity with the dashboard, NOT an
/// authorization mechanism — swap in real admin authentication before
/// exposing the API beyond a trusted network. Nothing else in the crate
/// treats this check as authorization.
pub(crate) fn require_same_origin(headers: &HeaderMap) -> Result<(), AppError> {
    let host = headers.get("host").and_then(|v| v.to_str().ok());
    let referer_host = headers
        .get("referer")
        .and_then(|v| v.to_str().ok())
        .and_then(|r| url::Url::parse(r).ok())
        .and_then(|u| {
            u.host_str().map(|h| match u.port() {
                Some(p) => format!("{h}:{p}"),
                None => h.to_string(),
            })
        });

    match (host, referer_host) {
        (Some(host), Some(referer)) if host == referer => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}
