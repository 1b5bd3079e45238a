//! Type definitions for the risk predictor

pub mod metadata;
pub mod patient;
pub mod prediction;

pub use metadata::FeatureMetadata;
pub use patient::{FieldValue, PatientError, PatientRecord, PATIENT_FIELDS};
pub use prediction::{PredictionResult, RiskLabel, Threshold};
