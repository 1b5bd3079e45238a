//! Preprocessing + classification pipeline
//!
//! The artifact mirrors a scikit-learn `Pipeline([("pre", ColumnTransformer),
//! ("clf", estimator)])` exported to JSON. The preprocessing stage turns one
//! [`InputRow`] into a dense feature vector; the classifier stage turns that
//! vector into the probability of the positive class.

use crate::feature_extractor::InputRow;
use crate::types::patient::FieldValue;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while validating or running a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input is missing column `{0}`")]
    MissingColumn(String),

    #[error("column `{column}` expects a number")]
    ExpectedNumber { column: String },

    #[error("column `{column}` expects a category")]
    ExpectedCategory { column: String },

    #[error("found unknown category `{value}` in column `{column}` during transform")]
    UnknownCategory { column: String, value: String },

    #[error("classifier expects {expected} features but the preprocessor produces {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("classifier produced a non-finite score: {0}")]
    NonFiniteScore(f64),

    #[error("onnx runtime: {0}")]
    Onnx(String),
}

/// Serialized pipeline document
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineArtifact {
    pub preprocessor: Preprocessor,
    pub classifier: ClassifierSpec,
}

/// How the one-hot stage treats categories it was not fitted on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleUnknown {
    #[default]
    Error,
    Ignore,
}

/// One column transformer of the preprocessing stage
#[derive(Debug, Clone, Deserialize)]
pub struct Transformer {
    pub name: String,
    #[serde(flatten)]
    pub kind: TransformerKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformerKind {
    StandardScaler {
        columns: Vec<String>,
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
    OneHot {
        columns: Vec<String>,
        categories: Vec<Vec<String>>,
        #[serde(default)]
        handle_unknown: HandleUnknown,
    },
    Passthrough {
        columns: Vec<String>,
    },
}

impl Transformer {
    pub fn columns(&self) -> &[String] {
        match &self.kind {
            TransformerKind::StandardScaler { columns, .. }
            | TransformerKind::OneHot { columns, .. }
            | TransformerKind::Passthrough { columns } => columns,
        }
    }

    fn output_width(&self) -> usize {
        match &self.kind {
            TransformerKind::OneHot { categories, .. } => categories.iter().map(Vec::len).sum(),
            TransformerKind::StandardScaler { columns, .. }
            | TransformerKind::Passthrough { columns } => columns.len(),
        }
    }

    fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidArtifact(format!("{}: {}", self.name, msg)));

        match &self.kind {
            TransformerKind::StandardScaler { columns, mean, scale } => {
                if mean.len() != columns.len() || scale.len() != columns.len() {
                    return invalid(format!(
                        "{} columns but {} means and {} scales",
                        columns.len(),
                        mean.len(),
                        scale.len()
                    ));
                }
                if mean.iter().chain(scale).any(|v| !v.is_finite()) {
                    return invalid("scaler parameters must be finite".to_string());
                }
            }
            TransformerKind::OneHot {
                columns, categories, ..
            } => {
                if categories.len() != columns.len() {
                    return invalid(format!(
                        "{} columns but {} category lists",
                        columns.len(),
                        categories.len()
                    ));
                }
                if let Some(column) = columns
                    .iter()
                    .zip(categories)
                    .find(|(_, levels)| levels.is_empty())
                    .map(|(c, _)| c)
                {
                    return invalid(format!("column `{}` has no categories", column));
                }
            }
            TransformerKind::Passthrough { .. } => {}
        }
        Ok(())
    }

    fn transform_into(&self, row: &InputRow, out: &mut Vec<f64>) -> Result<(), PipelineError> {
        match &self.kind {
            TransformerKind::StandardScaler {
                columns,
                mean,
                scale,
            } => {
                for ((column, mean), scale) in columns.iter().zip(mean).zip(scale) {
                    let x = number(row, column)?;
                    let scale = if *scale == 0.0 { 1.0 } else { *scale };
                    out.push((x - mean) / scale);
                }
            }
            TransformerKind::OneHot {
                columns,
                categories,
                handle_unknown,
            } => {
                for (column, levels) in columns.iter().zip(categories) {
                    let value = category(row, column)?;
                    let position = levels.iter().position(|level| level == value);
                    if position.is_none() && *handle_unknown == HandleUnknown::Error {
                        return Err(PipelineError::UnknownCategory {
                            column: column.clone(),
                            value: value.to_string(),
                        });
                    }
                    out.extend((0..levels.len()).map(|i| if Some(i) == position { 1.0 } else { 0.0 }));
                }
            }
            TransformerKind::Passthrough { columns } => {
                for column in columns {
                    out.push(number(row, column)?);
                }
            }
        }
        Ok(())
    }

    fn feature_names_into(&self, out: &mut Vec<String>) {
        match &self.kind {
            TransformerKind::OneHot {
                columns, categories, ..
            } => {
                for (column, levels) in columns.iter().zip(categories) {
                    out.extend(
                        levels
                            .iter()
                            .map(|level| format!("{}__{}_{}", self.name, column, level)),
                    );
                }
            }
            _ => out.extend(
                self.columns()
                    .iter()
                    .map(|column| format!("{}__{}", self.name, column)),
            ),
        }
    }
}

fn number(row: &InputRow, column: &str) -> Result<f64, PipelineError> {
    match row.get(column) {
        Some(FieldValue::Number(v)) => Ok(v),
        Some(FieldValue::Category(_)) => Err(PipelineError::ExpectedNumber {
            column: column.to_string(),
        }),
        None => Err(PipelineError::MissingColumn(column.to_string())),
    }
}

fn category(row: &InputRow, column: &str) -> Result<&'static str, PipelineError> {
    match row.get(column) {
        Some(FieldValue::Category(v)) => Ok(v),
        Some(FieldValue::Number(_)) => Err(PipelineError::ExpectedCategory {
            column: column.to_string(),
        }),
        None => Err(PipelineError::MissingColumn(column.to_string())),
    }
}

/// Column transformer stage
#[derive(Debug, Clone, Deserialize)]
pub struct Preprocessor {
    pub transformers: Vec<Transformer>,
}

impl Preprocessor {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.transformers.is_empty() {
            return Err(PipelineError::InvalidArtifact(
                "preprocessor has no transformers".to_string(),
            ));
        }
        self.transformers.iter().try_for_each(Transformer::validate)
    }

    /// Input columns in transformer order.
    pub fn input_columns(&self) -> impl Iterator<Item = (&str, &TransformerKind)> {
        self.transformers
            .iter()
            .flat_map(|t| t.columns().iter().map(move |c| (c.as_str(), &t.kind)))
    }

    pub fn output_width(&self) -> usize {
        self.transformers.iter().map(Transformer::output_width).sum()
    }

    /// Transformed feature names, e.g. `num__BMI` or `cat__Smoking_Yes`.
    pub fn feature_names_out(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.output_width());
        for transformer in &self.transformers {
            transformer.feature_names_into(&mut names);
        }
        names
    }

    pub fn transform(&self, row: &InputRow) -> Result<Vec<f64>, PipelineError> {
        let mut features = Vec::with_capacity(self.output_width());
        for transformer in &self.transformers {
            transformer.transform_into(row, &mut features)?;
        }
        Ok(features)
    }
}

/// Decision tree in array form; node 0 is the root.
#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

impl Tree {
    /// Children must come after their parent, which rules out cycles.
    fn validate(&self, n_features: usize) -> Result<(), PipelineError> {
        if self.nodes.is_empty() {
            return Err(PipelineError::InvalidArtifact("empty tree".to_string()));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = *node
            {
                if feature >= n_features {
                    return Err(PipelineError::InvalidArtifact(format!(
                        "node {} splits on feature {} of {}",
                        index, feature, n_features
                    )));
                }
                for child in [left, right] {
                    if child <= index || child >= self.nodes.len() {
                        return Err(PipelineError::InvalidArtifact(format!(
                            "node {} has invalid child {}",
                            index, child
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn evaluate(&self, x: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                TreeNode::Leaf { value } => return value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

/// Serialized classifier stage
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierSpec {
    LogisticRegression {
        coef: Vec<f64>,
        intercept: f64,
    },
    RandomForest {
        trees: Vec<Tree>,
        #[serde(default)]
        feature_importances: Option<Vec<f64>>,
    },
    GradientBoosting {
        init_score: f64,
        learning_rate: f64,
        trees: Vec<Tree>,
        #[serde(default)]
        feature_importances: Option<Vec<f64>>,
    },
    Onnx {
        path: PathBuf,
        #[serde(default)]
        feature_importances: Option<Vec<f64>>,
    },
}

/// Classifier stage of a loaded pipeline
pub trait Classifier: Send + Sync {
    /// Estimator name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Number of input features, when the estimator declares it
    fn n_features(&self) -> Option<usize>;

    /// Probability of the positive class for one transformed row
    fn predict_proba(&self, features: &[f64]) -> Result<f64, PipelineError>;

    /// Impurity-based importances, if the estimator exposes them
    fn feature_importances(&self) -> Option<&[f64]>;
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

pub struct LogisticRegression {
    coef: Vec<f64>,
    intercept: f64,
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &'static str {
        "logistic_regression"
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.coef.len())
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64, PipelineError> {
        let z: f64 = self
            .coef
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept;
        Ok(sigmoid(z))
    }

    fn feature_importances(&self) -> Option<&[f64]> {
        None
    }
}

/// Averaged probability trees
pub struct RandomForest {
    trees: Vec<Tree>,
    importances: Option<Vec<f64>>,
}

impl Classifier for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn n_features(&self) -> Option<usize> {
        None
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64, PipelineError> {
        let total: f64 = self.trees.iter().map(|t| t.evaluate(features)).sum();
        Ok((total / self.trees.len() as f64).clamp(0.0, 1.0))
    }

    fn feature_importances(&self) -> Option<&[f64]> {
        self.importances.as_deref()
    }
}

/// Additive margin trees with a logistic link
pub struct GradientBoosting {
    init_score: f64,
    learning_rate: f64,
    trees: Vec<Tree>,
    importances: Option<Vec<f64>>,
}

impl Classifier for GradientBoosting {
    fn name(&self) -> &'static str {
        "gradient_boosting"
    }

    fn n_features(&self) -> Option<usize> {
        None
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64, PipelineError> {
        let margin: f64 = self.trees.iter().map(|t| t.evaluate(features)).sum();
        Ok(sigmoid(self.init_score + self.learning_rate * margin))
    }

    fn feature_importances(&self) -> Option<&[f64]> {
        self.importances.as_deref()
    }
}

/// A validated, ready-to-run pipeline
pub struct Pipeline {
    preprocessor: Preprocessor,
    classifier: Box<dyn Classifier>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("transformers", &self.preprocessor.transformers.len())
            .field("features", &self.preprocessor.output_width())
            .field("classifier", &self.classifier.name())
            .finish()
    }
}

impl Pipeline {
    /// Validate an artifact and build its classifier.
    ///
    /// Relative ONNX paths are resolved against `base_dir`.
    pub fn from_artifact(
        artifact: PipelineArtifact,
        base_dir: &std::path::Path,
        onnx_threads: usize,
    ) -> Result<Self, PipelineError> {
        let PipelineArtifact {
            preprocessor,
            classifier,
        } = artifact;
        preprocessor.validate()?;
        let width = preprocessor.output_width();

        let check_importances = |importances: &Option<Vec<f64>>| match importances {
            Some(values) if values.len() != width => Err(PipelineError::InvalidArtifact(format!(
                "{} feature importances for {} features",
                values.len(),
                width
            ))),
            _ => Ok(()),
        };
        let check_trees = |trees: &[Tree]| {
            if trees.is_empty() {
                return Err(PipelineError::InvalidArtifact(
                    "tree ensemble has no trees".to_string(),
                ));
            }
            trees.iter().try_for_each(|t| t.validate(width))
        };

        let classifier: Box<dyn Classifier> = match classifier {
            ClassifierSpec::LogisticRegression { coef, intercept } => {
                if !intercept.is_finite() || coef.iter().any(|c| !c.is_finite()) {
                    return Err(PipelineError::InvalidArtifact(
                        "logistic coefficients must be finite".to_string(),
                    ));
                }
                Box::new(LogisticRegression { coef, intercept })
            }
            ClassifierSpec::RandomForest {
                trees,
                feature_importances,
            } => {
                check_trees(&trees)?;
                check_importances(&feature_importances)?;
                Box::new(RandomForest {
                    trees,
                    importances: feature_importances,
                })
            }
            ClassifierSpec::GradientBoosting {
                init_score,
                learning_rate,
                trees,
                feature_importances,
            } => {
                check_trees(&trees)?;
                check_importances(&feature_importances)?;
                Box::new(GradientBoosting {
                    init_score,
                    learning_rate,
                    trees,
                    importances: feature_importances,
                })
            }
            ClassifierSpec::Onnx {
                path,
                feature_importances,
            } => {
                check_importances(&feature_importances)?;
                let path = if path.is_relative() {
                    base_dir.join(path)
                } else {
                    path
                };
                onnx_classifier(&path, onnx_threads, feature_importances)?
            }
        };

        if let Some(expected) = classifier.n_features() {
            if expected != width {
                return Err(PipelineError::WidthMismatch {
                    expected,
                    actual: width,
                });
            }
        }

        Ok(Self {
            preprocessor,
            classifier,
        })
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    /// Run both stages on one row.
    pub fn predict_proba(&self, row: &InputRow) -> Result<f64, PipelineError> {
        let features = self.preprocessor.transform(row)?;
        let probability = self.classifier.predict_proba(&features)?;
        if !probability.is_finite() {
            return Err(PipelineError::NonFiniteScore(probability));
        }
        Ok(probability)
    }
}

#[cfg(feature = "onnx")]
fn onnx_classifier(
    path: &std::path::Path,
    onnx_threads: usize,
    importances: Option<Vec<f64>>,
) -> Result<Box<dyn Classifier>, PipelineError> {
    Ok(Box::new(crate::models::onnx::OnnxClassifier::load(
        path,
        onnx_threads,
        importances,
    )?))
}

#[cfg(not(feature = "onnx"))]
fn onnx_classifier(
    path: &std::path::Path,
    _onnx_threads: usize,
    _importances: Option<Vec<f64>>,
) -> Result<Box<dyn Classifier>, PipelineError> {
    Err(PipelineError::Onnx(format!(
        "{} requires the `onnx` feature",
        path.display()
    )))
}
