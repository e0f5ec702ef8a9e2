//! Wharf registry server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wharf_core::config::AppConfig;
use wharf_server::{AppState, create_router};
use wharf_storage::ObjectStore as _;

/// Wharf - an OCI container registry for resource-capped edge workers
#[derive(Parser, Debug)]
#[command(name = "wharfd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "WHARF_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("wharf v{}", env!("CARGO_PKG_VERSION"));

    // Configuration: optional TOML file, overridden by WHARF_ env vars.
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("no config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("WHARF_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    if let wharf_core::config::ObjectStoreConfig::Memory = config.object_store {
        tracing::warn!("using in-memory object store; data will not survive a restart");
    }
    if config.auth.enabled && config.auth.token_secret.is_empty() {
        anyhow::bail!("auth.enabled requires auth.token_secret to be set");
    }

    let objects = wharf_storage::from_config(&config.object_store)
        .await
        .context("failed to initialize object store")?;
    tracing::info!(backend = objects.backend_name(), "object store initialized");

    let kv = wharf_metadata::from_config(&config.metadata)
        .context("failed to initialize metadata store")?;
    tracing::info!("metadata store initialized");

    let bind = config.server.bind.clone();
    let state = AppState::new(config, objects, kv);
    let app = create_router(state);

    let addr: SocketAddr = bind.parse().context("invalid bind address")?;
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
