//! Conversion Service - Web Server Entry Point
//!
//! This binary starts the HTTP server that converts free-text clinical
//! orders into validated FHIR R4 transaction bundles.

use anyhow::Context;
use clap::Parser;
use funke::{api::create_router, config::Config, logging, state::AppState};

#[derive(Debug, Parser)]
#[command(name = "nlfhir-server", about = "Clinical order to FHIR bundle conversion service")]
struct Args {
    /// Load and validate configuration, print the listen address, then exit
    #[arg(long)]
    config_check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration first to get logging settings
    let config = Config::load().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let addr = config
        .socket_addr()
        .context("Failed to determine socket address")?;

    if args.config_check {
        println!("configuration ok; would listen on {addr}");
        return Ok(());
    }

    // Initialize logging based on configuration
    let _logging_guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_addr = %addr,
        validator_endpoints = config.validator.endpoints.len(),
        llm_enabled = config.extractor.llm.endpoint.is_some(),
        "Starting conversion service"
    );

    let state = AppState::new(config);
    let app = create_router(state);

    tracing::info!("Health check: http://{}/health", addr);
    tracing::info!("API endpoint: http://{}/convert", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener on {addr}"))?;

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server terminated unexpectedly");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
/// Docker sends SIGTERM, while Ctrl+C sends SIGINT
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).expect("Failed to install SIGTERM signal handler");
    let sigint = tokio::signal::ctrl_c();

    tokio::select! {
        _ = sigint => {
            tracing::info!("SIGINT received, starting graceful shutdown...");
        }
        _ = sigterm.recv() => {
            tracing::info!("SIGTERM received, starting graceful shutdown...");
        }
    }
}

/// Wait for shutdown signal (SIGINT only on non-Unix platforms)
#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
