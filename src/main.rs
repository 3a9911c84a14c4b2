//! pixiv-relay server binary.

use anyhow::{Context, Result};
use axum::http::Request;
use clap::Parser;
use std::path::PathBuf;
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use pixiv_relay::{AppState, Config, router};

/// Relay that serves pixiv illustrations by id.
#[derive(Parser, Debug)]
#[command(name = "pixiv-relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config file (defaults to the platform config directory).
    #[arg(long, env = "PIXIV_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listening port, overrides the config file.
    #[arg(long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = match args.config {
        Some(path) => path,
        None => Config::config_path()?,
    };
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate().context("Invalid configuration")?;
    tracing::info!(path = %config_path.display(), "configuration loaded");

    if config.session_cookie().is_none() {
        tracing::warn!("no session cookie configured, restricted works will not resolve");
    }

    let state = AppState::new(&config).context("Failed to initialize relay")?;

    if let Some(store) = state.relay.store() {
        store
            .ensure_root()
            .await
            .with_context(|| format!("Failed to create store at {}", store.root().display()))?;
        let removed = store
            .sweep_parts()
            .await
            .context("Failed to clean up partial store files")?;
        if removed > 0 {
            tracing::info!(removed, "removed partial files from an earlier run");
        }
    }

    let app = router(state).layer(TraceLayer::new_for_http().make_span_with(
        |request: &Request<_>| {
            tracing::span!(
                Level::INFO,
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
            )
        },
    ));

    let bind_addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!(addr = %bind_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
