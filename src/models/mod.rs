//! Model pipeline loading and inference

pub mod inference;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod output;
pub mod pipeline;

pub use inference::{InferenceEngine, PredictError};
pub use loader::ModelLoader;
pub use pipeline::{Pipeline, PipelineError};
