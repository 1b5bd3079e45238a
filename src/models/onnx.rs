//! ONNX Runtime classifier stage
//!
//! Runs an exported estimator on the already-transformed feature row.
//! Probabilities are read from a plain tensor output or from a ZipMap
//! `seq(map(int64, float))` output.

use crate::models::output;
use crate::models::pipeline::{Classifier, PipelineError};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

fn ort_error(e: ort::Error) -> PipelineError {
    PipelineError::Onnx(e.to_string())
}

pub struct OnnxClassifier {
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    importances: Option<Vec<f64>>,
}

impl OnnxClassifier {
    pub fn load(
        path: &Path,
        onnx_threads: usize,
        importances: Option<Vec<f64>>,
    ) -> Result<Self, PipelineError> {
        info!(path = %path.display(), threads = onnx_threads, "Loading ONNX classifier");

        let session = Session::builder()
            .map_err(ort_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_error)?
            .with_intra_threads(onnx_threads)
            .map_err(ort_error)?
            .commit_from_file(path)
            .map_err(|e| PipelineError::Onnx(format!("{}: {}", path.display(), e)))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(input = %input_name, output = %output_name, "ONNX classifier loaded");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            importances,
        })
    }

    /// Probability from the named output, else from any non-label output.
    fn extract_probability(&self, outputs: &SessionOutputs) -> Result<f64, PipelineError> {
        if let Some(value) = outputs.get(&self.output_name) {
            if let Some(p) = probability_from_value(value) {
                return Ok(p);
            }
        }

        for (name, value) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Some(p) = probability_from_value(&value) {
                debug!(output = %name, "Probability read from fallback output");
                return Ok(p);
            }
        }

        Err(PipelineError::Onnx(format!(
            "no probability found in output `{}`",
            self.output_name
        )))
    }
}

fn probability_from_value(value: &DynValue) -> Option<f64> {
    if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
        return output::from_tensor(shape, data);
    }
    if DynSequenceValueType::can_downcast(value.dtype()) {
        return probability_from_sequence_map(value).ok().flatten();
    }
    None
}

/// ZipMap output: one map per row, only the first row is scored.
fn probability_from_sequence_map(value: &DynValue) -> Result<Option<f64>, ort::Error> {
    let allocator = Allocator::default();
    let sequence = value.downcast_ref::<DynSequenceValueType>()?;
    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;

    let Some(first) = maps.first() else {
        return Ok(None);
    };
    let pairs = first.try_extract_key_values::<i64, f32>()?;
    Ok(output::from_class_map(&pairs))
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn n_features(&self) -> Option<usize> {
        None
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64, PipelineError> {
        let shape = vec![1_i64, features.len() as i64];
        let data: Vec<f32> = features.iter().map(|&x| x as f32).collect();
        let input = Tensor::from_array((shape, data)).map_err(ort_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| PipelineError::Onnx(format!("Lock error: {}", e)))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(ort_error)?;

        let probability = self.extract_probability(&outputs)?;
        debug!(probability, "ONNX inference complete");
        Ok(probability)
    }

    fn feature_importances(&self) -> Option<&[f64]> {
        self.importances.as_deref()
    }
}
