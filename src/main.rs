//! Application entry point and server initialization
//!
//! This module contains the main function that:
//! - Loads environment configuration
//! - Opens the smart link database and builds the render pipeline
//! - Starts the HTTP server with graceful shutdown support

use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use qrenzo::asset::DefaultAssetLoader;
use qrenzo::config::AppConfig;
use qrenzo::database::{AppState, RedbStore};
use qrenzo::encoder::QrCodeEncoder;
use qrenzo::pipeline::Renderer;
use qrenzo::route::create_app;

/// Application entry point
///
/// See [`AppConfig::from_env`] for the environment variables read at startup.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("qrenzo=debug,tower_http=debug")),
        )
        .init();

    let config = AppConfig::from_env()?;

    let store = RedbStore::open(&config.database_url)
        .with_context(|| format!("failed to open database `{}`", config.database_url))?;

    let renderer = Renderer::new(Arc::new(QrCodeEncoder), Arc::new(DefaultAssetLoader))
        .with_size(config.canvas_size);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Server running at {}", config.base_url);
    tracing::info!("Using database: {}", config.database_url);

    let state = AppState {
        store: Arc::new(store),
        renderer: Arc::new(renderer),
        config: Arc::new(config),
    };

    // Create the Axum router with all routes configured
    let app = create_app(state).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    // The server will continue running until it receives SIGTERM or SIGINT
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM
///
/// Open connections are allowed to complete and in-flight database
/// transactions commit before the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    // On non-Unix systems (Windows), only handle Ctrl+C
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping server");
}
