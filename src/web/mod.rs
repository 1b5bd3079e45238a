//! HTTP surface: the screening form and a JSON API over the same engine

pub mod handlers;
pub mod render;

use crate::config::AppConfig;
use crate::metrics::ServiceMetrics;
use crate::models::inference::InferenceEngine;
use crate::types::prediction::Threshold;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// State shared by every handler. The engine is loaded once and never mutated.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<InferenceEngine>,
    pub metrics: Arc<ServiceMetrics>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(engine: InferenceEngine, config: AppConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            metrics: Arc::new(ServiceMetrics::new()),
            config: Arc::new(config),
        }
    }

    /// Slider position for a fresh form.
    pub fn default_threshold(&self) -> Threshold {
        Threshold::from_percent(u32::from(self.config.detection.default_threshold_percent))
            .unwrap_or_default()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/predict", post(handlers::predict_form))
        .route("/importance", get(handlers::importance_page))
        .route("/importance.svg", get(handlers::importance_svg))
        .route("/api/predict", post(handlers::api_predict))
        .route("/api/importance", get(handlers::api_importance))
        .route("/api/schema", get(handlers::api_schema))
        .route("/api/metrics", get(handlers::api_metrics))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
