//! Stash server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use stash_core::config::AppConfig;
use stash_server::reconcile::rebuild_tombstones;
use stash_server::{create_router, AppState};
use stash_storage::BlobStore as _;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stash - a chunked upload and dedup service
#[derive(Parser, Debug)]
#[command(name = "stashd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "STASH_CONFIG", default_value = "config/server.toml")]
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

    tracing::info!("stash v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override everything).
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("no config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("STASH_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Initialize the blob store and verify it before accepting requests.
    let storage = stash_storage::from_config(&config.storage)
        .await
        .context("failed to initialize blob store")?;
    storage
        .health_check()
        .await
        .context("blob store health check failed")?;
    tracing::info!("blob store initialized");

    // Initialize the metadata store.
    let metadata = stash_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("metadata store initialized");

    // Initialize the coordination store.
    let coordination = stash_coordination::from_config(&config.coordination)
        .await
        .context("failed to initialize coordination store")?;
    tracing::info!("coordination store initialized");

    // Rebuild tombstones from metadata. Failure is not fatal: the init path
    // degrades to its metadata probe until the stores converge.
    match rebuild_tombstones(&metadata, &storage, &coordination).await {
        Ok(count) => tracing::info!(count, "startup reconciliation complete"),
        Err(e) => tracing::warn!(error = %e, "startup reconciliation failed"),
    }

    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    let bind = config.server.bind.clone();

    let state = AppState::new(config, storage, metadata, coordination)
        .context("failed to build application state")?;
    let app = create_router(state);

    let addr: SocketAddr = bind.parse().context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!("listening on {}", addr);

    // Serve until SIGINT/SIGTERM, then drain within the grace window.
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    let deadline = async {
        shutdown_signal().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => result.context("server error")?,
        _ = deadline => tracing::warn!("drain window elapsed, aborting open connections"),
    }

    tracing::info!("server stopped");
    Ok(())
}

/// Resolve when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
