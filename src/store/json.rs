use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::key::ApiKey;
use crate::models::service::{ServiceEndpoint, ServiceKind, ServiceStatus};
use crate::models::telemetry::{ConnectionLogEntry, UsageStat};
use crate::store::backend::StorageBackend;

const KEYS: &str = "keys";
const SERVICES: &str = "services";
const CONNECTIONS: &str = "connections";
const USAGE: &str = "usage";

/// Connection log retention. Most-recent entries win; older ones are evicted.
pub const MAX_CONNECTION_ENTRIES: usize = 50;

/// Typed collection store over a pluggable [`StorageBackend`].
///
/// Reads go straight to the backend; read-modify-write mutations are
/// serialized through one guard. Concurrent usage increments may still lose
/// updates across processes — the counters are advisory dashboard metrics.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn StorageBackend>,
    write_guard: Arc<Mutex<()>>,
}

impl Store {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            write_guard: Arc::new(Mutex::new(())),
        }
    }

    async fn load<T: DeserializeOwned>(&self, collection: &str) -> anyhow::Result<Vec<T>> {
        match self.backend.read(collection).await? {
            Some(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("corrupt {collection} collection")),
            None => Ok(Vec::new()),
        }
    }

    async fn save<T: Serialize>(&self, collection: &str, items: &[T]) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(items)?;
        self.backend.write(collection, &raw).await
    }

    // -- Key operations --

    pub async fn list_keys(&self) -> anyhow::Result<Vec<ApiKey>> {
        self.load(KEYS).await
    }

    /// Exact-secret lookup, filtered to active keys. Revoked and unknown
    /// secrets are indistinguishable to the caller.
    pub async fn find_active_key(&self, secret: &str) -> anyhow::Result<Option<ApiKey>> {
        let keys: Vec<ApiKey> = self.load(KEYS).await?;
        Ok(keys.into_iter().find(|k| k.secret == secret && k.is_active()))
    }

    pub async fn insert_key(&self, key: ApiKey) -> anyhow::Result<()> {
        let _guard = self.write_guard.lock().await;
        let mut keys: Vec<ApiKey> = self.load(KEYS).await?;
        if keys.iter().any(|k| k.secret == key.secret) {
            anyhow::bail!("secret collision while issuing key '{}'", key.name);
        }
        keys.push(key);
        self.save(KEYS, &keys).await
    }

    /// Full-record replace. Status edits are free-form: a revoked key can be
    /// reactivated from the dashboard.
    pub async fn update_key(&self, key: ApiKey) -> anyhow::Result<bool> {
        let _guard = self.write_guard.lock().await;
        let mut keys: Vec<ApiKey> = self.load(KEYS).await?;
        match keys.iter_mut().find(|k| k.id == key.id) {
            Some(slot) => {
                *slot = key;
                self.save(KEYS, &keys).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn delete_key(&self, id: &str) -> anyhow::Result<bool> {
        let _guard = self.write_guard.lock().await;
        let mut keys: Vec<ApiKey> = self.load(KEYS).await?;
        let before = keys.len();
        keys.retain(|k| k.id != id);
        if keys.len() == before {
            return Ok(false);
        }
        self.save(KEYS, &keys).await?;
        Ok(true)
    }

    // -- Service registry operations --

    pub async fn list_services(&self) -> anyhow::Result<Vec<ServiceEndpoint>> {
        self.load(SERVICES).await
    }

    pub async fn insert_service(&self, service: ServiceEndpoint) -> anyhow::Result<()> {
        let _guard = self.write_guard.lock().await;
        let mut services: Vec<ServiceEndpoint> = self.load(SERVICES).await?;
        services.push(service);
        self.save(SERVICES, &services).await
    }

    pub async fn update_service(&self, service: ServiceEndpoint) -> anyhow::Result<bool> {
        let _guard = self.write_guard.lock().await;
        let mut services: Vec<ServiceEndpoint> = self.load(SERVICES).await?;
        match services.iter_mut().find(|s| s.id == service.id) {
            Some(slot) => {
                *slot = service;
                self.save(SERVICES, &services).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The endpoint the forwarder consults for `kind`. When several are
    /// active, the most recently created wins (id breaks timestamp ties).
    pub async fn resolve_active_service(
        &self,
        kind: ServiceKind,
    ) -> anyhow::Result<Option<ServiceEndpoint>> {
        let services: Vec<ServiceEndpoint> = self.load(SERVICES).await?;
        Ok(services
            .into_iter()
            .filter(|s| s.kind == kind && s.is_active())
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            }))
    }

    /// First-run convenience: seed the registry from process defaults when
    /// the services collection is empty. Returns whether anything was written.
    pub async fn seed_services(
        &self,
        text_gen_url: Option<&str>,
        image_gen_url: Option<&str>,
    ) -> anyhow::Result<bool> {
        let _guard = self.write_guard.lock().await;
        let existing: Vec<ServiceEndpoint> = self.load(SERVICES).await?;
        if !existing.is_empty() {
            return Ok(false);
        }

        let now = Utc::now();
        let mut seeded = Vec::new();
        if let Some(url) = text_gen_url {
            seeded.push(ServiceEndpoint {
                id: format!("svc_{}", Uuid::new_v4().simple()),
                name: "Local text generation".into(),
                kind: ServiceKind::TextGeneration,
                base_url: url.into(),
                status: ServiceStatus::Active,
                upstream_secret: None,
                supported_models_hint: None,
                created_at: now,
            });
        }
        if let Some(url) = image_gen_url {
            seeded.push(ServiceEndpoint {
                id: format!("svc_{}", Uuid::new_v4().simple()),
                name: "Local image generation".into(),
                kind: ServiceKind::ImageGeneration,
                base_url: url.into(),
                status: ServiceStatus::Active,
                upstream_secret: None,
                supported_models_hint: None,
                created_at: now,
            });
        }
        if seeded.is_empty() {
            return Ok(false);
        }
        self.save(SERVICES, &seeded).await?;
        Ok(true)
    }

    // -- Telemetry collections --

    pub async fn push_connection(&self, entry: ConnectionLogEntry) -> anyhow::Result<()> {
        let _guard = self.write_guard.lock().await;
        let mut logs: Vec<ConnectionLogEntry> = self.load(CONNECTIONS).await?;
        logs.insert(0, entry);
        logs.truncate(MAX_CONNECTION_ENTRIES);
        self.save(CONNECTIONS, &logs).await
    }

    pub async fn recent_connections(&self, limit: usize) -> anyhow::Result<Vec<ConnectionLogEntry>> {
        let mut logs: Vec<ConnectionLogEntry> = self.load(CONNECTIONS).await?;
        logs.truncate(limit);
        Ok(logs)
    }

    pub async fn list_usage(&self) -> anyhow::Result<Vec<UsageStat>> {
        self.load(USAGE).await
    }

    /// Compound usage update: bump today's counter, then touch the key's
    /// `usage_count`/`last_used_at`. Best-effort — a partial failure leaves
    /// the advisory metrics slightly off and is reported to the caller, who
    /// logs and moves on.
    pub async fn record_usage(&self, key_id: &str) -> anyhow::Result<()> {
        let _guard = self.write_guard.lock().await;
        let now = Utc::now();
        let today = now.date_naive();

        let mut stats: Vec<UsageStat> = self.load(USAGE).await?;
        match stats.iter_mut().find(|s| s.date == today) {
            Some(stat) => stat.requests += 1,
            None => stats.push(UsageStat {
                date: today,
                requests: 1,
            }),
        }
        self.save(USAGE, &stats).await?;

        let mut keys: Vec<ApiKey> = self.load(KEYS).await?;
        if let Some(key) = keys.iter_mut().find(|k| k.id == key_id) {
            key.usage_count += 1;
            key.last_used_at = Some(now);
            self.save(KEYS, &keys).await?;
        }
        Ok(())
    }
}
