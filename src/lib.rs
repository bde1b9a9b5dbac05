//! Keystone gateway — library crate.
//!
//! Exposes the router, stores, and translators so integration tests in
//! `tests/` can drive the real request pipeline.

use std::sync::Arc;

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod models;
pub mod proxy;
pub mod store;
pub mod telemetry;

/// Shared application state passed to handlers.
pub struct AppState {
    pub store: store::json::Store,
    pub upstream: proxy::upstream::UpstreamClient,
    pub config: config::Config,
}

/// Build the full application router: forwarding endpoints + admin API,
/// nested under `/api/v1`, plus an unauthenticated health probe.
pub fn app_router(state: Arc<AppState>) -> axum::Router {
    let v1 = proxy::proxy_router().merge(api::api_router());

    axum::Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .nest("/api/v1", v1)
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
