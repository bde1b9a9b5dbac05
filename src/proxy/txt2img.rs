use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::errors::AppError;
use crate::models::service::ServiceKind;
use crate::proxy;
use crate::telemetry;
use crate::AppState;

/// Known fields of a txt2img call. Everything else (sampler settings, sizes,
/// `override_settings`, …) rides along untyped and is forwarded verbatim.
#[derive(Debug, Deserialize)]
pub struct Txt2ImgRequest {
    pub prompt: String,
    #[serde(default)]
    pub override_settings: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Image-generation endpoint: validates the minimum shape, then relays the
/// original body to `{base}/sdapi/v1/txt2img` on the active endpoint.
pub async fn txt2img(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let key = proxy::auth::authenticate(&headers, &state.store).await?;

    telemetry::record_connection(
        state.store.clone(),
        telemetry::connection_entry(&key, "/api/v1/sd/txt2img", &headers),
    );

    let raw_body: Value =
        serde_json::from_slice(&body).map_err(|e| AppError::InvalidJson(e.to_string()))?;
    let req: Txt2ImgRequest = serde_json::from_value(raw_body.clone())
        .map_err(|e| AppError::Validation(json!({ "message": e.to_string() })))?;

    // The checkpoint override selects the model backend-side; only logged here.
    let model = req
        .override_settings
        .as_ref()
        .and_then(|s| s.get("sd_model_checkpoint"))
        .and_then(Value::as_str)
        .unwrap_or("default");
    tracing::debug!(key = %key.name, %model, "forwarding txt2img request");

    let base = proxy::resolve_active_url(&state, ServiceKind::ImageGeneration).await?;
    let url = format!("{base}/sdapi/v1/txt2img");

    // Forward the body exactly as received, not a re-serialization of the
    // typed view.
    let payload = serde_json::to_vec(&raw_body).map_err(|e| AppError::Internal(e.into()))?;

    let resp = state
        .upstream
        .forward(reqwest::Method::POST, &url, payload)
        .await?;
    let (status, value) = proxy::read_upstream_json(resp).await?;

    telemetry::record_usage(state.store.clone(), key.id);

    Ok((status, Json(value)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_fields_survive_typed_validation() {
        let body = json!({
            "prompt": "a lighthouse at dusk",
            "steps": 30,
            "width": 768,
            "override_settings": { "sd_model_checkpoint": "dreamshaper_8" },
        });

        let req: Txt2ImgRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.prompt, "a lighthouse at dusk");
        assert_eq!(req.extra["steps"], 30);
        assert_eq!(req.extra["width"], 768);
        assert_eq!(
            req.override_settings.unwrap()["sd_model_checkpoint"],
            "dreamshaper_8"
        );
    }

    #[test]
    fn missing_prompt_fails_validation() {
        let body = json!({ "steps": 30 });
        assert!(serde_json::from_value::<Txt2ImgRequest>(body).is_err());
    }
}
