//! Configuration management for the risk predictor service

use anyhow::{ensure, Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_PIPELINE_FILE: &str = "model_pipeline.json";
pub const DEFAULT_METADATA_FILE: &str = "feature_metadata.json";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory containing the pipeline and metadata files
    pub models_dir: String,
    #[serde(default = "default_pipeline_file")]
    pub pipeline_file: String,
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_pipeline_file() -> String {
    DEFAULT_PIPELINE_FILE.to_string()
}

fn default_metadata_file() -> String {
    DEFAULT_METADATA_FILE.to_string()
}

fn default_onnx_threads() -> usize {
    1
}

/// Classification defaults
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Initial slider position, in percent
    #[serde(default = "default_threshold_percent")]
    pub default_threshold_percent: u8,
    /// Number of features in the importance chart
    #[serde(default = "default_top_features")]
    pub top_features: usize,
}

fn default_threshold_percent() -> u8 {
    50
}

fn default_top_features() -> usize {
    10
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            default_threshold_percent: default_threshold_percent(),
            top_features: default_top_features(),
        }
    }
}

/// Importance chart canvas size in pixels
#[derive(Debug, Clone, Deserialize)]
pub struct ChartConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 480,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl AppConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        let app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.detection.default_threshold_percent <= 100,
            "detection.default_threshold_percent must be at most 100, got {}",
            self.detection.default_threshold_percent
        );
        ensure!(self.detection.top_features > 0, "detection.top_features must be positive");
        ensure!(
            self.chart.width >= 200 && self.chart.height >= 150,
            "chart size {}x{} is too small",
            self.chart.width,
            self.chart.height
        );
        ensure!(self.models.onnx_threads > 0, "models.onnx_threads must be positive");
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8501,
            },
            models: ModelsConfig {
                models_dir: "models".to_string(),
                pipeline_file: default_pipeline_file(),
                metadata_file: default_metadata_file(),
                onnx_threads: 1,
            },
            detection: DetectionConfig::default(),
            chart: ChartConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Json,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_address(), "127.0.0.1:8501");
        assert_eq!(config.models.pipeline_file, "model_pipeline.json");
        assert_eq!(config.detection.default_threshold_percent, 50);
        assert_eq!(config.detection.top_features, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_path_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[server]
host = "0.0.0.0"
port = 9000

[models]
models_dir = "artifacts"

[logging]
level = "debug"
format = "pretty"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.models.models_dir, "artifacts");
        assert_eq!(config.models.metadata_file, "feature_metadata.json");
        assert_eq!(config.models.onnx_threads, 1);
        assert_eq!(config.detection.top_features, 10);
        assert_eq!(config.chart.width, 800);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut config = AppConfig::default();
        config.detection.default_threshold_percent = 120;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load_from_path("does/not/exist.toml").is_err());
    }

    #[test]
    fn test_shipped_config_loads() {
        let config = AppConfig::load_from_path(
            Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH),
        )
        .unwrap();
        assert_eq!(config.models.models_dir, "models");
    }
}
