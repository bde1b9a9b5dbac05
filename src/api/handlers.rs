use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::require_same_origin;
use crate::errors::AppError;
use crate::models::key::ApiKey;
use crate::models::service::{ServiceEndpoint, ServiceKind, ServiceStatus};
use crate::models::telemetry::{ConnectionLogEntry, UsageStat};
use crate::AppState;

// ── Request DTOs ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
}

fn default_rate_limit() -> u32 {
    100
}

#[derive(Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub kind: ServiceKind,
    pub base_url: String,
    pub status: ServiceStatus,
    #[serde(default)]
    pub upstream_secret: Option<String>,
    #[serde(default)]
    pub supported_models_hint: Option<String>,
}

fn validate_base_url(raw: &str) -> Result<(), AppError> {
    let parsed = url::Url::parse(raw)
        .map_err(|_| AppError::Validation(json!({ "message": "base_url must be a valid URL" })))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(AppError::Validation(
            json!({ "message": "base_url must use http or https" }),
        ));
    }
    Ok(())
}

// ── Key handlers ─────────────────────────────────────────────

/// GET /api/v1/keys — full key records for the dashboard table.
pub async fn list_keys(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ApiKey>>, AppError> {
    let keys = state.store.list_keys().await.map_err(AppError::Internal)?;
    Ok(Json(keys))
}

/// POST /api/v1/keys — issue a key with a server-generated secret.
pub async fn create_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateKeyRequest>,
) -> Result<Response, AppError> {
    require_same_origin(&headers)?;
    if payload.name.trim().len() < 2 {
        return Err(AppError::Validation(
            json!({ "message": "name must be at least 2 characters" }),
        ));
    }

    let key = ApiKey::issue(payload.name, payload.rate_limit);
    state
        .store
        .insert_key(key.clone())
        .await
        .map_err(AppError::Internal)?;
    tracing::info!(key = %key.name, "issued API key");

    Ok((StatusCode::CREATED, Json(key)).into_response())
}

/// PUT /api/v1/keys — full-record update. Status edits are free-form, so a
/// revoked key can be reactivated from the dashboard.
pub async fn update_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ApiKey>,
) -> Result<Response, AppError> {
    require_same_origin(&headers)?;

    let updated = state
        .store
        .update_key(payload.clone())
        .await
        .map_err(AppError::Internal)?;
    if updated {
        Ok(Json(payload).into_response())
    } else {
        Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "API key not found" })),
        )
            .into_response())
    }
}

/// DELETE /api/v1/keys/:id — the only path that physically removes a key.
pub async fn delete_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    require_same_origin(&headers)?;

    let deleted = state
        .store
        .delete_key(&id)
        .await
        .map_err(AppError::Internal)?;
    if deleted {
        Ok(Json(json!({ "deleted": true })).into_response())
    } else {
        Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "API key not found" })),
        )
            .into_response())
    }
}

// ── Service handlers ─────────────────────────────────────────

/// GET /api/v1/services
pub async fn list_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ServiceEndpoint>>, AppError> {
    let services = state
        .store
        .list_services()
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(services))
}

/// POST /api/v1/services
pub async fn create_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateServiceRequest>,
) -> Result<Response, AppError> {
    require_same_origin(&headers)?;
    if payload.name.trim().len() < 2 {
        return Err(AppError::Validation(
            json!({ "message": "name must be at least 2 characters" }),
        ));
    }
    validate_base_url(&payload.base_url)?;

    let service = ServiceEndpoint {
        id: format!("svc_{}", Uuid::new_v4().simple()),
        name: payload.name,
        kind: payload.kind,
        base_url: payload.base_url,
        status: payload.status,
        upstream_secret: payload.upstream_secret,
        supported_models_hint: payload.supported_models_hint,
        created_at: Utc::now(),
    };
    state
        .store
        .insert_service(service.clone())
        .await
        .map_err(AppError::Internal)?;
    tracing::info!(service = %service.name, kind = service.kind.as_str(), "registered service endpoint");

    Ok((StatusCode::CREATED, Json(service)).into_response())
}

/// PUT /api/v1/services — full-record update.
pub async fn update_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ServiceEndpoint>,
) -> Result<Response, AppError> {
    require_same_origin(&headers)?;
    validate_base_url(&payload.base_url)?;

    let updated = state
        .store
        .update_service(payload.clone())
        .await
        .map_err(AppError::Internal)?;
    if updated {
        Ok(Json(payload).into_response())
    } else {
        Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "service not found" })),
        )
            .into_response())
    }
}

// ── Telemetry reads ──────────────────────────────────────────

/// GET /api/v1/metrics — daily request counters for the usage chart.
pub async fn list_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UsageStat>>, AppError> {
    let stats = state.store.list_usage().await.map_err(AppError::Internal)?;
    Ok(Json(stats))
}

/// GET /api/v1/connections — most recent accepted connections.
pub async fn recent_connections(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ConnectionLogEntry>>, AppError> {
    let connections = state
        .store
        .recent_connections(10)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(connections))
}
