//! cueflow-server - music library analysis and playlist generation service
//!
//! Startup order: resolve configuration, initialise logging, open the
//! feature store (verifying the data root is writable), then serve. On
//! SIGINT/SIGTERM every live task is cancelled and the cache index is
//! flushed under a five-second deadline.
//!
//! Exit codes: 1 configuration error, 2 data-root I/O error, 3 bind failure.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cueflow_server::config::{Args, Config};
use cueflow_server::extractor::SignalExtractor;
use cueflow_server::store::Store;
use cueflow_server::{build_router, AppState};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = match Config::resolve(args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    let default_level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cueflow={default_level},{default_level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("starting cueflow-server");
    info!("version: {}", env!("CARGO_PKG_VERSION"));
    info!("data root: {}", config.data_root.display());
    if let Some(library) = &config.music_library_path {
        info!("music library: {}", library.display());
    }

    let store = match Store::init(&config.data_root, config.cache_ttl_days).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(error = %err, "data root unusable");
            std::process::exit(2);
        }
    };

    let bind_addr = config.bind_addr();
    let state = AppState::new(
        Arc::new(config),
        Arc::clone(&store),
        Arc::new(SignalExtractor::new()),
    );

    let shutdown = CancellationToken::new();
    let sweeper = state.tasks.spawn_sweeper(shutdown.clone());

    let app = build_router(state.clone());
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(addr = %bind_addr, error = %err, "bind failed");
            std::process::exit(3);
        }
    };
    info!("listening on http://{bind_addr}");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %err, "server error");
    }

    info!("shutting down");
    shutdown.cancel();
    state.tasks.cancel_all().await;
    sweeper.abort();
    match tokio::time::timeout(Duration::from_secs(5), store.shutdown()).await {
        Ok(Ok(())) => info!("cache index flushed"),
        Ok(Err(err)) => error!(error = %err, "cache index flush failed"),
        Err(_) => error!("cache index flush exceeded the shutdown deadline"),
    }
}

/// Resolve on SIGINT or, on unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("ctrl-c handler installs");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("signal handler installs")
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
