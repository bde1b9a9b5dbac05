//! Fire-and-forget telemetry writers.
//!
//! Connection/usage recording must never block or fail the response path:
//! each write runs on its own spawned task with a local error boundary that
//! only logs.

use axum::http::HeaderMap;
use chrono::Utc;
use uuid::Uuid;

use crate::models::key::ApiKey;
use crate::models::telemetry::ConnectionLogEntry;
use crate::store::json::Store;

/// Build a connection entry from the authenticated key and request headers.
pub fn connection_entry(key: &ApiKey, path: &str, headers: &HeaderMap) -> ConnectionLogEntry {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };

    ConnectionLogEntry {
        id: format!("conn_{}", Uuid::new_v4().simple()),
        timestamp: Utc::now(),
        key_id: key.id.clone(),
        key_name: key.name.clone(),
        path: path.to_string(),
        // First hop of X-Forwarded-For when a reverse proxy is in front.
        client_ip: header_str("x-forwarded-for")
            .map(|v| v.split(',').next().unwrap_or(&v).trim().to_string()),
        user_agent: header_str("user-agent"),
        geo: header_str("cf-ipcountry"),
    }
}

pub fn record_connection(store: Store, entry: ConnectionLogEntry) {
    let key_id = entry.key_id.clone();
    tokio::spawn(async move {
        if let Err(e) = store.push_connection(entry).await {
            tracing::error!(%key_id, "failed to record connection: {:#}", e);
        }
    });
}

pub fn record_usage(store: Store, key_id: String) {
    tokio::spawn(async move {
        if let Err(e) = store.record_usage(&key_id).await {
            tracing::error!(%key_id, "failed to record usage: {:#}", e);
        }
    });
}
