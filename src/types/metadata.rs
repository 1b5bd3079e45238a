//! Feature metadata descriptor shipped next to the model artifact

use crate::types::patient::{FieldKind, PATIENT_FIELDS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Describes the columns the model was trained on.
///
/// Informational only: differences from [`PATIENT_FIELDS`] are reported by
/// [`FeatureMetadata::discrepancies`] but never stop a prediction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMetadata {
    /// Name of the training target column
    #[serde(default)]
    pub target: Option<String>,

    pub numeric_features: Vec<String>,

    pub categorical_features: Vec<String>,

    /// Category levels seen during training
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
}

impl FeatureMetadata {
    pub fn feature_count(&self) -> usize {
        self.numeric_features.len() + self.categorical_features.len()
    }

    /// Human-readable differences between this descriptor and the form schema.
    pub fn discrepancies(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for spec in &PATIENT_FIELDS {
            let (listed_as_expected, listed_as_other) = match spec.kind {
                FieldKind::Numeric { .. } => (
                    self.numeric_features.iter().any(|f| f == spec.column),
                    self.categorical_features.iter().any(|f| f == spec.column),
                ),
                FieldKind::Categorical { .. } => (
                    self.categorical_features.iter().any(|f| f == spec.column),
                    self.numeric_features.iter().any(|f| f == spec.column),
                ),
            };

            if listed_as_other {
                issues.push(format!("{} is listed with the wrong kind", spec.column));
            } else if !listed_as_expected {
                issues.push(format!("{} is not listed", spec.column));
            }

            if let (FieldKind::Categorical { options }, Some(levels)) =
                (spec.kind, self.categories.get(spec.column))
            {
                for option in options {
                    if !levels.iter().any(|l| l == option) {
                        issues.push(format!(
                            "{} option `{}` was not seen in training",
                            spec.column, option
                        ));
                    }
                }
            }
        }

        for name in self.numeric_features.iter().chain(&self.categorical_features) {
            if !PATIENT_FIELDS.iter().any(|f| f.column == name.as_str()) {
                issues.push(format!("{} is not collected by the form", name));
            }
        }

        issues
    }
}
