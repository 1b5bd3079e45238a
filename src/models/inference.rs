//! Inference engine for heart disease risk screening

use crate::config::AppConfig;
use crate::feature_extractor::{FeatureExtractor, SchemaError};
use crate::importance::ImportanceError;
use crate::models::loader::{LoadedArtifacts, ModelLoader};
use crate::models::pipeline::{Pipeline, PipelineError};
use crate::types::metadata::FeatureMetadata;
use crate::types::patient::{PatientError, PatientRecord};
use crate::types::prediction::{PredictionResult, Threshold};
use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a single prediction could not be produced
#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    InvalidPatient(#[from] PatientError),

    #[error("prediction failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("classifier returned probability {0} outside [0, 1]")]
    ProbabilityOutOfRange(f64),
}

impl PredictError {
    /// True when the caller sent bad input rather than the model failing.
    pub fn is_input_error(&self) -> bool {
        matches!(self, PredictError::InvalidPatient(_))
    }
}

/// Read-only engine shared by every request
pub struct InferenceEngine {
    pipeline: Pipeline,
    metadata: FeatureMetadata,
    extractor: FeatureExtractor,
}

impl InferenceEngine {
    /// Create a new inference engine from configuration
    pub fn new(config: &AppConfig) -> Result<Self> {
        let loader = ModelLoader::from_config(&config.models);
        let artifacts = loader.load().context("Failed to load model artifacts")?;
        Self::from_artifacts(artifacts).context("Model pipeline does not match the patient form")
    }

    /// Create an engine from already loaded artifacts, enforcing the schema contract
    pub fn from_artifacts(artifacts: LoadedArtifacts) -> Result<Self, SchemaError> {
        let LoadedArtifacts { pipeline, metadata } = artifacts;
        let extractor = FeatureExtractor::new();

        let report = extractor.check_schema(pipeline.preprocessor())?;
        for column in &report.unused_columns {
            warn!(column = %column, "Form column is not used by the pipeline");
        }
        for option in &report.unencodable_options {
            warn!(option = %option, "Form option is unknown to the pipeline and will fail at prediction time");
        }
        for issue in metadata.discrepancies() {
            warn!(issue = %issue, "Feature metadata differs from the patient form");
        }

        info!(
            classifier = pipeline.classifier().name(),
            input_columns = extractor.feature_count(),
            transformed_features = pipeline.preprocessor().output_width(),
            "Inference engine initialized"
        );

        Ok(Self {
            pipeline,
            metadata,
            extractor,
        })
    }

    pub fn metadata(&self) -> &FeatureMetadata {
        &self.metadata
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn classifier_name(&self) -> &'static str {
        self.pipeline.classifier().name()
    }

    /// Probability of the positive class for one record
    pub fn probability(&self, record: &PatientRecord) -> Result<f64, PredictError> {
        record.validate()?;
        let row = self.extractor.extract(record);
        let probability = self.pipeline.predict_proba(&row)?;

        if !(0.0..=1.0).contains(&probability) {
            return Err(PredictError::ProbabilityOutOfRange(probability));
        }
        Ok(probability)
    }

    /// Score a record and classify it against `threshold`
    pub fn predict(
        &self,
        record: &PatientRecord,
        threshold: Threshold,
    ) -> Result<PredictionResult, PredictError> {
        let probability = self.probability(record)?;
        let result = PredictionResult::new(probability, threshold);

        debug!(
            prediction_id = %result.prediction_id,
            probability = result.probability,
            threshold = result.threshold.percent(),
            label = %result.label,
            "Prediction complete"
        );

        Ok(result)
    }

    /// Transformed feature names paired with classifier importances
    pub fn raw_feature_importances(&self) -> Result<(Vec<String>, Vec<f64>), ImportanceError> {
        let classifier = self.pipeline.classifier();
        let scores = classifier
            .feature_importances()
            .ok_or(ImportanceError::Unavailable {
                classifier: classifier.name(),
            })?;
        Ok((self.pipeline.preprocessor().feature_names_out(), scores.to_vec()))
    }
}
