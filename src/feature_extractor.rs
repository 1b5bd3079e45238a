//! Builds pipeline input rows from patient records.
//!
//! The column names and kinds here are the contract between the form and the
//! pipeline's preprocessing stage. [`FeatureExtractor::check_schema`] verifies
//! that contract once, when the artifact is loaded, so a mismatched artifact
//! is rejected at startup instead of failing on the first submission.

use crate::models::pipeline::{HandleUnknown, Preprocessor, TransformerKind};
use crate::types::patient::{field_spec, FieldKind, FieldValue, PatientRecord, PATIENT_FIELDS};
use std::collections::HashMap;
use thiserror::Error;

/// Single-row structured input keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputRow {
    values: HashMap<&'static str, FieldValue>,
}

impl InputRow {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (&'static str, FieldValue)>) -> Self {
        Self {
            values: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<FieldValue> {
        self.values.get(column).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Contract violations that make an artifact unusable with this form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("pipeline expects column `{0}` which the form does not collect")]
    UnknownColumn(String),

    #[error("pipeline treats `{column}` as {expected} but the form collects it as {actual}")]
    KindMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Non-fatal observations from a schema check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    /// Form columns the pipeline drops
    pub unused_columns: Vec<&'static str>,
    /// `column=option` pairs the one-hot stage will reject at prediction time
    pub unencodable_options: Vec<String>,
}

/// Transforms patient records into model input rows.
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new() -> Self {
        Self
    }

    /// Extract the 17 input columns of a record.
    pub fn extract(&self, record: &PatientRecord) -> InputRow {
        InputRow::from_pairs(record.columns())
    }

    /// Get the number of input columns produced.
    pub fn feature_count(&self) -> usize {
        PATIENT_FIELDS.len()
    }

    /// Get column names in form order.
    pub fn feature_names(&self) -> Vec<&'static str> {
        PATIENT_FIELDS.iter().map(|f| f.column).collect()
    }

    /// Verify that every pipeline input column is collected with the right kind.
    pub fn check_schema(&self, preprocessor: &Preprocessor) -> Result<SchemaReport, SchemaError> {
        let mut report = SchemaReport::default();
        let mut consumed = Vec::new();

        for (column, kind) in preprocessor.input_columns() {
            let spec = field_spec(column).ok_or_else(|| SchemaError::UnknownColumn(column.to_string()))?;
            consumed.push(spec.column);

            let expected = match kind {
                TransformerKind::OneHot { .. } => "categorical",
                TransformerKind::StandardScaler { .. } | TransformerKind::Passthrough { .. } => {
                    "numeric"
                }
            };
            let actual = if spec.is_numeric() { "numeric" } else { "categorical" };
            if expected != actual {
                return Err(SchemaError::KindMismatch {
                    column: column.to_string(),
                    expected,
                    actual,
                });
            }
        }

        for transformer in &preprocessor.transformers {
            if let TransformerKind::OneHot {
                columns,
                categories,
                handle_unknown: HandleUnknown::Error,
            } = &transformer.kind
            {
                for (column, levels) in columns.iter().zip(categories) {
                    let Some(FieldKind::Categorical { options }) = field_spec(column).map(|s| s.kind)
                    else {
                        continue;
                    };
                    for option in options {
                        if !levels.iter().any(|level| level == option) {
                            report.unencodable_options.push(format!("{}={}", column, option));
                        }
                    }
                }
            }
        }

        report.unused_columns = PATIENT_FIELDS
            .iter()
            .map(|f| f.column)
            .filter(|c| !consumed.contains(c))
            .collect();

        Ok(report)
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pipeline::Transformer;

    fn transformer(name: &str, kind: TransformerKind) -> Transformer {
        Transformer {
            name: name.to_string(),
            kind,
        }
    }

    #[test]
    fn test_feature_extraction() {
        let extractor = FeatureExtractor::new();
        let record = PatientRecord {
            bmi: 31.2,
            ..PatientRecord::default()
        };

        let row = extractor.extract(&record);

        assert_eq!(row.len(), extractor.feature_count());
        assert_eq!(row.get("BMI"), Some(FieldValue::Number(31.2)));
        assert_eq!(row.get("AgeCategory"), Some(FieldValue::Category("18-24")));
        assert_eq!(row.get("Cholesterol"), None);
    }

    #[test]
    fn test_feature_names() {
        let extractor = FeatureExtractor::new();
        let names = extractor.feature_names();
        assert_eq!(names.len(), 17);
        assert_eq!(names[0], "BMI");
        assert_eq!(names[16], "SkinCancer");
    }

    #[test]
    fn test_schema_unknown_column() {
        let pre = Preprocessor {
            transformers: vec![transformer(
                "num",
                TransformerKind::Passthrough {
                    columns: vec!["Cholesterol".to_string()],
                },
            )],
        };
        assert_eq!(
            FeatureExtractor::new().check_schema(&pre),
            Err(SchemaError::UnknownColumn("Cholesterol".to_string()))
        );
    }

    #[test]
    fn test_schema_kind_mismatch() {
        let pre = Preprocessor {
            transformers: vec![transformer(
                "num",
                TransformerKind::StandardScaler {
                    columns: vec!["Sex".to_string()],
                    mean: vec![0.0],
                    scale: vec![1.0],
                },
            )],
        };
        assert!(matches!(
            FeatureExtractor::new().check_schema(&pre),
            Err(SchemaError::KindMismatch {
                expected: "numeric",
                actual: "categorical",
                ..
            })
        ));
    }

    #[test]
    fn test_schema_report() {
        let pre = Preprocessor {
            transformers: vec![
                transformer(
                    "num",
                    TransformerKind::Passthrough {
                        columns: vec!["BMI".to_string()],
                    },
                ),
                transformer(
                    "cat",
                    TransformerKind::OneHot {
                        columns: vec!["Sex".to_string()],
                        categories: vec![vec!["Female".to_string()]],
                        handle_unknown: HandleUnknown::Error,
                    },
                ),
            ],
        };
        let report = FeatureExtractor::new().check_schema(&pre).unwrap();
        assert_eq!(report.unencodable_options, vec!["Sex=Male".to_string()]);
        assert_eq!(report.unused_columns.len(), 15);
        assert!(!report.unused_columns.contains(&"BMI"));
    }
}
