//! Model artifact loader

use crate::config::ModelsConfig;
use crate::models::pipeline::{Pipeline, PipelineArtifact};
use crate::types::metadata::FeatureMetadata;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

/// Pipeline and metadata read from the models directory
#[derive(Debug)]
pub struct LoadedArtifacts {
    pub pipeline: Pipeline,
    pub metadata: FeatureMetadata,
}

/// Loader for the serialized pipeline and its metadata descriptor
#[derive(Debug, Clone)]
pub struct ModelLoader {
    /// Directory holding both files
    models_dir: PathBuf,
    pipeline_file: String,
    metadata_file: String,
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a loader for the default file names in `models_dir`
    pub fn new<P: AsRef<Path>>(models_dir: P) -> Self {
        Self {
            models_dir: models_dir.as_ref().to_path_buf(),
            pipeline_file: crate::config::DEFAULT_PIPELINE_FILE.to_string(),
            metadata_file: crate::config::DEFAULT_METADATA_FILE.to_string(),
            onnx_threads: 1,
        }
    }

    /// Create a loader from configuration
    pub fn from_config(config: &ModelsConfig) -> Self {
        Self {
            models_dir: PathBuf::from(&config.models_dir),
            pipeline_file: config.pipeline_file.clone(),
            metadata_file: config.metadata_file.clone(),
            onnx_threads: config.onnx_threads,
        }
    }

    pub fn pipeline_path(&self) -> PathBuf {
        self.models_dir.join(&self.pipeline_file)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.models_dir.join(&self.metadata_file)
    }

    /// Load both artifacts. Any failure is fatal for the caller.
    pub fn load(&self) -> Result<LoadedArtifacts> {
        let pipeline = self.load_pipeline()?;
        let metadata = self.load_metadata()?;
        Ok(LoadedArtifacts { pipeline, metadata })
    }

    /// Load and validate the pipeline artifact
    pub fn load_pipeline(&self) -> Result<Pipeline> {
        let path = self.pipeline_path();
        info!(path = %path.display(), "Loading model pipeline");

        let artifact: PipelineArtifact = read_json(&path)?;
        let pipeline = Pipeline::from_artifact(artifact, &self.models_dir, self.onnx_threads)
            .with_context(|| format!("Invalid model pipeline in {}", path.display()))?;

        info!(
            classifier = pipeline.classifier().name(),
            transformers = pipeline.preprocessor().transformers.len(),
            features = pipeline.preprocessor().output_width(),
            "Model pipeline loaded successfully"
        );

        Ok(pipeline)
    }

    /// Load the feature metadata descriptor
    pub fn load_metadata(&self) -> Result<FeatureMetadata> {
        let path = self.metadata_path();
        info!(path = %path.display(), "Loading feature metadata");

        let metadata: FeatureMetadata = read_json(&path)?;

        info!(
            numeric = metadata.numeric_features.len(),
            categorical = metadata.categorical_features.len(),
            target = metadata.target.as_deref().unwrap_or("unknown"),
            "Feature metadata loaded"
        );

        Ok(metadata)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}
