//! Heart Disease Risk Predictor - Main Entry Point
//!
//! Loads the trained pipeline once, then serves the screening form and JSON
//! API until interrupted.

use anyhow::{Context, Result};
use heart_risk_predictor::{
    config::{AppConfig, LogFormat, DEFAULT_CONFIG_PATH},
    models::inference::InferenceEngine,
    web::{self, AppState},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load_from_path(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    init_logging(&config);
    info!(config = %config_path, "Starting Heart Disease Risk Predictor");
    info!(
        default_threshold = config.detection.default_threshold_percent,
        top_features = config.detection.top_features,
        "Configuration loaded successfully"
    );

    // A missing or inconsistent artifact is fatal: nothing is served without it.
    let engine = match InferenceEngine::new(&config) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to load model pipeline");
            return Err(e);
        }
    };

    let address = config.server.bind_address();
    let state = AppState::new(engine, config);
    let metrics = state.metrics.clone();
    let app = web::router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    metrics.print_summary();

    Ok(())
}
