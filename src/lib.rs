//! Heart Disease Risk Predictor Library
//!
//! Screens a single patient record with a pre-trained classification
//! pipeline and explains the result with the model's feature importances.

pub mod chart;
pub mod config;
pub mod feature_extractor;
pub mod importance;
pub mod metrics;
pub mod models;
pub mod types;
pub mod web;

pub use config::AppConfig;
pub use feature_extractor::FeatureExtractor;
pub use models::inference::InferenceEngine;
pub use types::{PatientRecord, PredictionResult, RiskLabel, Threshold};
