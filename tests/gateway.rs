//! End-to-end tests for the forwarding pipeline and the admin API.
//!
//! Each test builds the real router over an in-memory store and points the
//! service registry at a wiremock MockServer standing in for the backend.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use keystone::config::{Config, StoreBackendKind};
use keystone::models::key::{ApiKey, KeyStatus};
use keystone::models::service::{ServiceEndpoint, ServiceKind, ServiceStatus};
use keystone::proxy::upstream::UpstreamClient;
use keystone::store::backend::{MemoryBackend, StorageBackend};
use keystone::store::json::Store;
use keystone::{app_router, AppState};

// ── Harness ──────────────────────────────────────────────────

fn test_config() -> Config {
    Config {
        port: 0,
        data_dir: "unused".into(),
        store_backend: StoreBackendKind::Memory,
        dashboard_origin: "http://localhost:3000".into(),
        seed_text_gen_url: None,
        seed_image_gen_url: None,
    }
}

fn app_with(store: Store) -> axum::Router {
    let state = Arc::new(AppState {
        store,
        upstream: UpstreamClient::new(),
        config: test_config(),
    });
    app_router(state)
}

fn memory_store() -> Store {
    Store::new(Arc::new(MemoryBackend::new()))
}

async fn issue_key(store: &Store) -> ApiKey {
    let key = ApiKey::issue("integration", 100);
    store.insert_key(key.clone()).await.unwrap();
    key
}

async fn register_service(store: &Store, kind: ServiceKind, base_url: &str) {
    store
        .insert_service(ServiceEndpoint {
            id: format!("svc_{}", Uuid::new_v4().simple()),
            name: format!("{} backend", kind.as_str()),
            kind,
            base_url: base_url.into(),
            status: ServiceStatus::Active,
            upstream_secret: None,
            supported_models_hint: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
}

fn post_json(uri: &str, bearer: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn chat_body() -> Value {
    json!({
        "model": "llama3",
        "messages": [
            { "role": "system", "content": "Be terse." },
            { "role": "user", "content": "What's the weather in Boston?" }
        ],
    })
}

// ── Authentication ───────────────────────────────────────────

#[tokio::test]
async fn wrong_token_is_401_and_never_reaches_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let store = memory_store();
    issue_key(&store).await;
    register_service(&store, ServiceKind::TextGeneration, &upstream.uri()).await;

    let response = app_with(store)
        .oneshot(post_json("/api/v1/chat/completions", Some("wrong"), &chat_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    // MockServer verifies the zero-call expectation on drop.
}

#[tokio::test]
async fn revoked_and_unknown_tokens_are_indistinguishable() {
    let store = memory_store();
    let mut key = ApiKey::issue("revoked", 100);
    key.status = KeyStatus::Revoked;
    let revoked_secret = key.secret.clone();
    store.insert_key(key).await.unwrap();

    let app = app_with(store);

    let revoked = app
        .clone()
        .oneshot(post_json(
            "/api/v1/chat/completions",
            Some(&revoked_secret),
            &chat_body(),
        ))
        .await
        .unwrap();
    let unknown = app
        .oneshot(post_json(
            "/api/v1/chat/completions",
            Some("ks_does_not_exist"),
            &chat_body(),
        ))
        .await
        .unwrap();

    assert_eq!(revoked.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(revoked).await, body_json(unknown).await);
}

#[tokio::test]
async fn missing_authorization_header_is_401() {
    let response = app_with(memory_store())
        .oneshot(post_json("/api/v1/chat/completions", None, &chat_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ── Chat-completions translation ─────────────────────────────

#[tokio::test]
async fn chat_tool_call_reply_round_trips() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "stream": false, "format": "json" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": r#"{"tool_call":{"name":"get_weather","arguments":{"location":"Boston"}}}"#,
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let store = memory_store();
    let key = issue_key(&store).await;
    register_service(&store, ServiceKind::TextGeneration, &upstream.uri()).await;

    let response = app_with(store)
        .oneshot(post_json(
            "/api/v1/chat/completions",
            Some(&key.secret),
            &chat_body(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["choices"][0]["finish_reason"], "tool_calls");
    assert_eq!(
        body["choices"][0]["message"]["tool_calls"][0]["function"]["name"],
        "get_weather"
    );
}

#[tokio::test]
async fn chat_prose_reply_is_trimmed_text_with_stop() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "  The weather in Boston is sunny.\n",
        })))
        .mount(&upstream)
        .await;

    let store = memory_store();
    let key = issue_key(&store).await;
    register_service(&store, ServiceKind::TextGeneration, &upstream.uri()).await;

    let response = app_with(store)
        .oneshot(post_json(
            "/api/v1/chat/completions",
            Some(&key.secret),
            &chat_body(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(
        body["choices"][0]["message"]["content"],
        "The weather in Boston is sunny."
    );
}

#[tokio::test]
async fn chat_without_active_text_service_is_503() {
    let store = memory_store();
    let key = issue_key(&store).await;

    let response = app_with(store)
        .oneshot(post_json(
            "/api/v1/chat/completions",
            Some(&key.secret),
            &chat_body(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Service not configured");
}

#[tokio::test]
async fn chat_schema_violation_is_400_with_details() {
    let store = memory_store();
    let key = issue_key(&store).await;

    // messages is required.
    let response = app_with(store)
        .oneshot(post_json(
            "/api/v1/chat/completions",
            Some(&key.secret),
            &json!({ "model": "llama3" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid request body");
    assert!(body["details"]["message"].is_string());
}

// ── Image generation ─────────────────────────────────────────

#[tokio::test]
async fn txt2img_without_active_image_service_is_503() {
    let store = memory_store();
    let key = issue_key(&store).await;
    // An active *text* service must not satisfy an image request.
    register_service(&store, ServiceKind::TextGeneration, "http://localhost:1").await;

    let response = app_with(store)
        .oneshot(post_json(
            "/api/v1/sd/txt2img",
            Some(&key.secret),
            &json!({ "prompt": "a lighthouse at dusk" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn txt2img_forwards_body_verbatim_and_relays_reply() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sdapi/v1/txt2img"))
        .and(body_partial_json(json!({
            "prompt": "a lighthouse at dusk",
            "steps": 30,
            "override_settings": { "sd_model_checkpoint": "dreamshaper_8" },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": ["aGVsbG8="],
            "info": "{}",
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let store = memory_store();
    let key = issue_key(&store).await;
    register_service(&store, ServiceKind::ImageGeneration, &upstream.uri()).await;

    let response = app_with(store)
        .oneshot(post_json(
            "/api/v1/sd/txt2img",
            Some(&key.secret),
            &json!({
                "prompt": "a lighthouse at dusk",
                "steps": 30,
                "override_settings": { "sd_model_checkpoint": "dreamshaper_8" },
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["images"][0], "aGVsbG8=");
}

// ── Passthrough proxy ────────────────────────────────────────

#[tokio::test]
async fn passthrough_forwards_to_api_path_and_relays_json() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "llama3" }],
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let store = memory_store();
    let key = issue_key(&store).await;
    register_service(&store, ServiceKind::TextGeneration, &upstream.uri()).await;

    let response = app_with(store)
        .oneshot(post_json("/api/v1/proxy/tags", Some(&key.secret), &json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["models"][0]["name"], "llama3");
}

#[tokio::test]
async fn passthrough_rejects_malformed_json() {
    let store = memory_store();
    let key = issue_key(&store).await;
    register_service(&store, ServiceKind::TextGeneration, "http://localhost:1").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/proxy/generate")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", key.secret))
        .body(Body::from("{not json"))
        .unwrap();

    let response = app_with(store).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid JSON in request body");
}

#[tokio::test]
async fn upstream_error_status_is_relayed_wrapped() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model 'nope' not found"))
        .mount(&upstream)
        .await;

    let store = memory_store();
    let key = issue_key(&store).await;
    register_service(&store, ServiceKind::TextGeneration, &upstream.uri()).await;

    let response = app_with(store)
        .oneshot(post_json(
            "/api/v1/proxy/generate",
            Some(&key.secret),
            &json!({ "model": "nope" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Error from upstream service");
    assert_eq!(body["details"], "model 'nope' not found");
}

// ── Telemetry isolation ──────────────────────────────────────

/// Backend that fails every telemetry write but stores everything else.
struct FlakyTelemetryBackend {
    inner: MemoryBackend,
}

#[async_trait::async_trait]
impl StorageBackend for FlakyTelemetryBackend {
    async fn read(&self, collection: &str) -> anyhow::Result<Option<String>> {
        self.inner.read(collection).await
    }

    async fn write(&self, collection: &str, contents: &str) -> anyhow::Result<()> {
        if collection == "connections" || collection == "usage" {
            anyhow::bail!("telemetry store offline");
        }
        self.inner.write(collection, contents).await
    }
}

#[tokio::test]
async fn telemetry_failures_do_not_change_the_response() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "All systems nominal.",
        })))
        .mount(&upstream)
        .await;

    let store = Store::new(Arc::new(FlakyTelemetryBackend {
        inner: MemoryBackend::new(),
    }));
    let key = issue_key(&store).await;
    register_service(&store, ServiceKind::TextGeneration, &upstream.uri()).await;

    let response = app_with(store)
        .oneshot(post_json(
            "/api/v1/chat/completions",
            Some(&key.secret),
            &chat_body(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["choices"][0]["message"]["content"], "All systems nominal.");

    // Let the spawned telemetry tasks hit their error boundary.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
}

// ── Admin API ────────────────────────────────────────────────

#[tokio::test]
async fn admin_reads_list_keys_and_connections() {
    let store = memory_store();
    issue_key(&store).await;

    let app = app_with(store);

    let keys = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/keys")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(keys.status(), StatusCode::OK);
    let keys = body_json(keys).await;
    assert_eq!(keys.as_array().unwrap().len(), 1);
    assert!(keys[0]["secret"].as_str().unwrap().starts_with("ks_"));

    let connections = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/connections")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(connections.status(), StatusCode::OK);
}

#[tokio::test]
async fn service_mutation_requires_same_origin_referer() {
    let store = memory_store();
    let app = app_with(store);

    let payload = json!({
        "name": "Ollama box",
        "kind": "text-generation",
        "base_url": "http://ollama:11434",
        "status": "active",
    });

    let cross_site = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/services")
                .header("content-type", "application/json")
                .header("host", "localhost:3000")
                .header("referer", "http://elsewhere.example/form")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(cross_site.status(), StatusCode::UNAUTHORIZED);

    let same_origin = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/services")
                .header("content-type", "application/json")
                .header("host", "localhost:3000")
                .header("referer", "http://localhost:3000/services")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(same_origin.status(), StatusCode::CREATED);
    let created = body_json(same_origin).await;
    assert_eq!(created["kind"], "text-generation");
    assert!(created["id"].as_str().unwrap().starts_with("svc_"));
}

#[tokio::test]
async fn issued_key_status_is_editable_via_update() {
    let store = memory_store();
    let app = app_with(store.clone());

    let issue = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/keys")
                .header("content-type", "application/json")
                .header("host", "localhost:3000")
                .header("referer", "http://localhost:3000/keys")
                .body(Body::from(json!({ "name": "dashboard key" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(issue.status(), StatusCode::CREATED);
    let mut key: Value = body_json(issue).await;
    assert_eq!(key["status"], "active");

    key["status"] = "revoked".into();
    let update = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/v1/keys")
                .header("content-type", "application/json")
                .header("host", "localhost:3000")
                .header("referer", "http://localhost:3000/keys")
                .body(Body::from(key.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(update.status(), StatusCode::OK);

    let secret = key["secret"].as_str().unwrap();
    assert!(store.find_active_key(secret).await.unwrap().is_none());
}

// ── File backend ─────────────────────────────────────────────

#[tokio::test]
async fn file_backend_round_trips_collections() {
    use keystone::store::backend::FileBackend;

    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(Arc::new(FileBackend::new(dir.path())));

    let key = ApiKey::issue("persisted", 100);
    let secret = key.secret.clone();
    store.insert_key(key).await.unwrap();

    // A second store over the same directory sees the write.
    let reopened = Store::new(Arc::new(FileBackend::new(dir.path())));
    let found = reopened.find_active_key(&secret).await.unwrap();
    assert_eq!(found.unwrap().name, "persisted");

    assert!(dir.path().join("keys.json").exists());
}
