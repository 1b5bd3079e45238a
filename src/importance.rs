//! Feature importance reporting
//!
//! Pairs the classifier's importance scores with the preprocessing stage's
//! output names, ranks them and hands the top entries to the chart renderer.
//! Every failure on this path is recoverable: the caller shows a warning and
//! keeps rendering the prediction.

use crate::chart;
use crate::config::ChartConfig;
use crate::models::inference::InferenceEngine;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Headline shown in place of the chart when extraction fails.
pub const WARNING_MESSAGE: &str = "Could not display feature importance.";

#[derive(Debug, Error)]
pub enum ImportanceError {
    #[error("'{classifier}' classifier does not expose feature_importances_")]
    Unavailable { classifier: &'static str },

    #[error("{names} feature names but {scores} importance scores")]
    LengthMismatch { names: usize, scores: usize },

    #[error("importance for `{feature}` is not a finite number")]
    NonFinite { feature: String },

    #[error("chart rendering failed: {0}")]
    Chart(String),
}

/// One ranked entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Strip the transformer prefix from an output name: `cat__Smoking_Yes` becomes `Smoking_Yes`.
pub fn clean_feature_name(raw: &str) -> &str {
    raw.split("__").nth(1).unwrap_or(raw)
}

/// Pair names with scores, sort descending and keep the first `top_n`.
pub fn rank_importances(
    names: &[String],
    scores: &[f64],
    top_n: usize,
) -> Result<Vec<FeatureImportance>, ImportanceError> {
    if names.len() != scores.len() {
        return Err(ImportanceError::LengthMismatch {
            names: names.len(),
            scores: scores.len(),
        });
    }

    let mut ranked = names
        .iter()
        .zip(scores)
        .map(|(name, &importance)| {
            if !importance.is_finite() {
                return Err(ImportanceError::NonFinite {
                    feature: name.clone(),
                });
            }
            Ok(FeatureImportance {
                feature: clean_feature_name(name).to_string(),
                importance,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Stable sort keeps pipeline order among ties.
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked.truncate(top_n);
    Ok(ranked)
}

/// Ranked importances of the loaded classifier.
pub fn top_features(
    engine: &InferenceEngine,
    top_n: usize,
) -> Result<Vec<FeatureImportance>, ImportanceError> {
    let (names, scores) = engine.raw_feature_importances()?;
    rank_importances(&names, &scores, top_n)
}

/// What the importance section of a page shows.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportanceReport {
    Chart {
        svg: String,
        features: Vec<FeatureImportance>,
    },
    Warning {
        detail: String,
    },
}

impl ImportanceReport {
    pub fn is_chart(&self) -> bool {
        matches!(self, ImportanceReport::Chart { .. })
    }
}

/// Rank the top `top_n` importances and draw them. Returns the SVG and the plotted entries.
pub fn build_chart(
    engine: &InferenceEngine,
    config: &ChartConfig,
    top_n: usize,
) -> Result<(String, Vec<FeatureImportance>), ImportanceError> {
    let features = top_features(engine, top_n)?;
    let svg = chart::render_importance_chart(&features, top_n, config.width, config.height)?;
    debug!(top_n, "Feature importance chart rendered");
    Ok((svg, features))
}

/// Build the chart, or a warning carrying the raw error text.
pub fn report(engine: &InferenceEngine, config: &ChartConfig, top_n: usize) -> ImportanceReport {
    match build_chart(engine, config, top_n) {
        Ok((svg, features)) => ImportanceReport::Chart { svg, features },
        Err(e) => {
            warn!(error = %e, classifier = engine.classifier_name(), "{}", WARNING_MESSAGE);
            ImportanceReport::Warning {
                detail: e.to_string(),
            }
        }
    }
}
