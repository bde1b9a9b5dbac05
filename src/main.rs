use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keystone::config::{self, Config, StoreBackendKind};
use keystone::models::key::{ApiKey, KeyStatus};
use keystone::proxy::upstream::UpstreamClient;
use keystone::store::backend::{FileBackend, MemoryBackend, StorageBackend};
use keystone::store::json::Store;
use keystone::{app_router, cli, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "keystone=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Key { command }) => {
            let store = build_store(&cfg);
            handle_key_command(command, &store).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

/// Select the persistence strategy once, at startup. Handlers never switch
/// backends at runtime.
fn build_store(cfg: &Config) -> Store {
    let backend: Arc<dyn StorageBackend> = match cfg.store_backend {
        StoreBackendKind::File => Arc::new(FileBackend::new(cfg.data_dir.clone())),
        StoreBackendKind::Memory => Arc::new(MemoryBackend::new()),
    };
    Store::new(backend)
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    let store = build_store(&cfg);

    if store
        .seed_services(
            cfg.seed_text_gen_url.as_deref(),
            cfg.seed_image_gen_url.as_deref(),
        )
        .await?
    {
        tracing::info!("seeded empty service registry from process defaults");
    }

    let dashboard_origin = cfg.dashboard_origin.clone();
    let state = Arc::new(AppState {
        store,
        upstream: UpstreamClient::new(),
        config: cfg,
    });

    let app = app_router(state)
        // Image payloads are large; everything else sits far below this.
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024))
        .layer({
            use axum::http::{HeaderName, Method};
            use tower_http::cors::AllowOrigin;
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(move |origin, _| {
                    let origin_str = origin.to_str().unwrap_or("");
                    origin_str == dashboard_origin
                        || origin_str.starts_with("http://localhost:")
                        || origin_str.starts_with("http://127.0.0.1:")
                }))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    HeaderName::from_static("content-type"),
                    HeaderName::from_static("authorization"),
                ])
        });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Keystone gateway listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn handle_key_command(cmd: cli::KeyCommands, store: &Store) -> anyhow::Result<()> {
    match cmd {
        cli::KeyCommands::Create { name, rate_limit } => {
            let key = ApiKey::issue(name, rate_limit);
            store.insert_key(key.clone()).await?;
            println!(
                "Key issued:\n  ID:   {}\n  Name: {}\n  Use:  Authorization: Bearer {}",
                key.id, key.name, key.secret
            );
        }
        cli::KeyCommands::List => {
            let keys = store.list_keys().await?;
            if keys.is_empty() {
                println!("No keys found.");
                return Ok(());
            }
            println!(
                "{:<38} {:<24} {:<10} {:<8} CREATED",
                "ID", "NAME", "STATUS", "USAGE"
            );
            for k in keys {
                let status = match k.status {
                    KeyStatus::Active => "active",
                    KeyStatus::Revoked => "revoked",
                };
                println!(
                    "{:<38} {:<24} {:<10} {:<8} {}",
                    k.id,
                    k.name,
                    status,
                    k.usage_count,
                    k.created_at.format("%Y-%m-%d")
                );
            }
        }
        cli::KeyCommands::Revoke { id } => {
            let keys = store.list_keys().await?;
            match keys.into_iter().find(|k| k.id == id) {
                Some(mut key) => {
                    key.status = KeyStatus::Revoked;
                    store.update_key(key).await?;
                    println!("Key revoked.");
                }
                None => println!("Key not found."),
            }
        }
    }
    Ok(())
}
