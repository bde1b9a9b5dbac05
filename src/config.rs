#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackendKind {
    File,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Root directory for the file-backed store's JSON documents.
    pub data_dir: String,
    /// Persistence strategy, selected once at startup.
    /// Set via KEYSTONE_STORE (file | memory). Default: file.
    pub store_backend: StoreBackendKind,
    /// Origin allowed by CORS for the admin dashboard.
    pub dashboard_origin: String,
    /// Seed URL for a text-generation endpoint, applied only when the
    /// service registry is empty on startup.
    pub seed_text_gen_url: Option<String>,
    /// Same, for the image-generation endpoint.
    pub seed_image_gen_url: Option<String>,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let store_backend = match std::env::var("KEYSTONE_STORE").as_deref() {
        Ok("memory") => StoreBackendKind::Memory,
        Ok("file") | Err(_) => StoreBackendKind::File,
        Ok(other) => anyhow::bail!("KEYSTONE_STORE must be 'file' or 'memory', got '{}'", other),
    };

    Ok(Config {
        port: std::env::var("KEYSTONE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080),
        data_dir: std::env::var("KEYSTONE_DATA_DIR").unwrap_or_else(|_| "data".into()),
        store_backend,
        dashboard_origin: std::env::var("KEYSTONE_DASHBOARD_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".into()),
        seed_text_gen_url: std::env::var("KEYSTONE_TEXT_GEN_URL").ok(),
        seed_image_gen_url: std::env::var("KEYSTONE_IMAGE_GEN_URL").ok(),
    })
}
