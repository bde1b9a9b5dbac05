use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::errors::AppError;
use crate::models::service::ServiceKind;
use crate::proxy;
use crate::telemetry;
use crate::AppState;

/// Text-generation passthrough: authenticate, then relay the JSON body to
/// `{base}/api/{path}` on the active text-generation endpoint.
pub async fn passthrough(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let key = proxy::auth::authenticate(&headers, &state.store).await?;
    tracing::debug!(key = %key.name, %path, "passthrough request authenticated");

    telemetry::record_connection(
        state.store.clone(),
        telemetry::connection_entry(&key, &format!("/api/v1/proxy/{path}"), &headers),
    );

    // Forwarded as-is, but it must at least be JSON.
    let json_body: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| AppError::InvalidJson(e.to_string()))?;

    let base = proxy::resolve_active_url(&state, ServiceKind::TextGeneration).await?;
    let url = format!("{base}/api/{path}");

    let method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid method: {e}")))?;
    let payload = serde_json::to_vec(&json_body).map_err(|e| AppError::Internal(e.into()))?;

    let resp = state.upstream.forward(method, &url, payload).await?;
    let (status, value) = proxy::read_upstream_json(resp).await?;

    telemetry::record_usage(state.store.clone(), key.id);

    Ok((status, Json(value)).into_response())
}
