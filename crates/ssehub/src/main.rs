//! # ssehub
//!
//! Server-Sent Events push hub.
//!
//! ## Overview
//!
//! Serves one event stream per client plus the routes of the built-in
//! plugins: a ticking counter, a whitelisted command runner and a web
//! terminal.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ssehub::{build_app, default_plugins, AppState};
use ssehub_core::ServerConfig;
use ssehub_session::SessionRegistry;
use ssehub_terminal::ProcessExecutor;

/// Server-Sent Events push hub
#[derive(Parser, Debug)]
#[command(name = "ssehub", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "SSEHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides server.bind
    #[arg(long)]
    bind: Option<String>,

    /// Log level, overrides server.log_level
    #[arg(long)]
    log_level: Option<String>,
}

fn load_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ServerConfig::default(),
    };

    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(level) = &cli.log_level {
        config.server.log_level = level.clone();
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    info!("ssehub v{} starting", env!("CARGO_PKG_VERSION"));

    let addr = config.server.bind_addr()?;
    let grace = config.server.shutdown_grace();
    let keep_alive = config.server.keep_alive();

    let plugins = default_plugins(&config, Arc::new(ProcessExecutor::new()));
    let state = AppState::new(config, plugins)?;
    let registry = Arc::clone(&state.registry);

    let shutdown = CancellationToken::new();
    let tasks = state.runtime.start(&registry, &shutdown);
    let app = build_app(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        "Listening on {} (keep-alive every {:?})",
        addr, keep_alive
    );

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(drain(Arc::clone(&registry), shutdown.clone()))
    .into_future();

    let deadline = {
        let shutdown = shutdown.clone();
        async move {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        }
    };

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        _ = deadline => warn!("Connections still open after {:?}, exiting", grace),
    }

    for task in tasks {
        task.abort();
    }
    info!("ssehub stopped");
    Ok(())
}

/// Wait for a shutdown signal, then stop plugins and close every session so
/// open streams end.
async fn drain(registry: Arc<SessionRegistry>, shutdown: CancellationToken) {
    shutdown_signal().await;
    shutdown.cancel();
    registry.close_all();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
