//! Inference Service - Main Entry Point
//!
//! Loads the artifacts named by the configuration, then serves
//! `/ping`, `/invocations` and `/metrics` until shut down.

use anyhow::{Context, Result};
use inference_service::{
    config::{AppConfig, LogFormat},
    load_artifacts,
    metrics::ServiceMetrics,
    models::InferenceEngine,
    server::{self, AppState},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_logging(config.log_format)?;

    info!("Starting Inference Service");
    info!(
        model_path = %config.model_path.display(),
        preproc_path = %config.preproc_path.display(),
        model_format = ?config.model_format,
        "Configuration loaded successfully"
    );

    let metrics = ServiceMetrics::new()?;
    let engine = Arc::new(InferenceEngine::new());

    // Artifacts must be in place before the listener is bound
    let artifacts = load_artifacts(&config).map_err(|e| {
        error!(error = %format!("{:#}", e), "Failed to load artifacts");
        e
    })?;
    engine.install(artifacts)?;

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    server::serve(listener, AppState::new(engine, metrics)).await
}

fn init_logging(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("inference_service=info".parse()?)
        .add_directive("tower_http=info".parse()?);

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}
