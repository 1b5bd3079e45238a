//! Prediction result and threshold classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Closing sentence of every interpretation paragraph.
pub const DISCLAIMER: &str = "This result is based on the health and lifestyle information provided. \
It is not a clinical diagnosis and should only be used as a preliminary screening tool. \
For accurate diagnosis and treatment, please consult a licensed medical professional.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("threshold must be between 0 and 100 percent, got {0}")]
pub struct ThresholdError(pub u32);

/// User-chosen decision boundary, stored as a whole percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Threshold(u8);

impl Threshold {
    pub const MAX_PERCENT: u8 = 100;

    pub fn from_percent(percent: u32) -> Result<Self, ThresholdError> {
        if percent > u32::from(Self::MAX_PERCENT) {
            return Err(ThresholdError(percent));
        }
        Ok(Self(percent as u8))
    }

    pub fn percent(&self) -> u8 {
        self.0
    }

    /// Threshold as a probability in [0, 1].
    pub fn fraction(&self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(50)
    }
}

impl TryFrom<u32> for Threshold {
    type Error = ThresholdError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_percent(value)
    }
}

impl From<Threshold> for u32 {
    fn from(value: Threshold) -> Self {
        u32::from(value.0)
    }
}

/// Binary risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLabel {
    #[serde(rename = "At Risk")]
    AtRisk,
    #[serde(rename = "Not At Risk")]
    NotAtRisk,
}

impl RiskLabel {
    /// At risk iff `probability >= threshold`.
    pub fn classify(probability: f64, threshold: Threshold) -> Self {
        if probability >= threshold.fraction() {
            RiskLabel::AtRisk
        } else {
            RiskLabel::NotAtRisk
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::AtRisk => "At Risk",
            RiskLabel::NotAtRisk => "Not At Risk",
        }
    }

    pub fn is_at_risk(&self) -> bool {
        matches!(self, RiskLabel::AtRisk)
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one screening request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Identifier used to correlate log lines with a rendered result
    pub prediction_id: String,

    /// Probability of the positive ("at risk") class
    pub probability: f64,

    /// Label derived from `probability` and `threshold`
    pub label: RiskLabel,

    /// Threshold the label was derived with
    pub threshold: Threshold,

    /// Evaluation timestamp
    pub evaluated_at: DateTime<Utc>,
}

impl PredictionResult {
    pub fn new(probability: f64, threshold: Threshold) -> Self {
        Self {
            prediction_id: Uuid::new_v4().to_string(),
            probability,
            label: RiskLabel::classify(probability, threshold),
            threshold,
            evaluated_at: Utc::now(),
        }
    }

    /// Probability as a percentage with two decimals, e.g. `73.00%`.
    pub fn confidence_display(&self) -> String {
        format!("{:.2}%", self.probability * 100.0)
    }

    /// Threshold as a fraction with two decimals, e.g. `0.50`.
    pub fn threshold_display(&self) -> String {
        format!("{:.2}", self.threshold.fraction())
    }

    /// Natural-language reading of the result.
    pub fn interpretation(&self) -> String {
        format!(
            "The model predicts that there is a {:.0}% probability that this patient may be {} for developing heart disease.",
            self.probability * 100.0,
            self.label.as_str().to_uppercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(p: u32) -> Threshold {
        Threshold::from_percent(p).unwrap()
    }

    #[test]
    fn test_threshold_bounds() {
        assert_eq!(pct(0).fraction(), 0.0);
        assert_eq!(pct(100).fraction(), 1.0);
        assert_eq!(Threshold::from_percent(101), Err(ThresholdError(101)));
        assert_eq!(Threshold::default().percent(), 50);
    }

    #[test]
    fn test_classify_scenarios() {
        let result = PredictionResult::new(0.73, pct(50));
        assert_eq!(result.label, RiskLabel::AtRisk);
        assert_eq!(result.confidence_display(), "73.00%");
        assert_eq!(result.threshold_display(), "0.50");

        let result = PredictionResult::new(0.73, pct(80));
        assert_eq!(result.label, RiskLabel::NotAtRisk);
        assert_eq!(result.threshold_display(), "0.80");
    }

    #[test]
    fn test_equal_probability_is_at_risk() {
        assert_eq!(RiskLabel::classify(0.73, pct(73)), RiskLabel::AtRisk);
        assert_eq!(RiskLabel::classify(0.0, pct(0)), RiskLabel::AtRisk);
        assert_eq!(RiskLabel::classify(1.0, pct(100)), RiskLabel::AtRisk);
        assert_eq!(RiskLabel::classify(0.999, pct(100)), RiskLabel::NotAtRisk);
    }

    #[test]
    fn test_interpretation_text() {
        let result = PredictionResult::new(0.73, pct(50));
        assert_eq!(
            result.interpretation(),
            "The model predicts that there is a 73% probability that this patient may be AT RISK for developing heart disease."
        );

        let result = PredictionResult::new(0.124, pct(50));
        assert!(result.interpretation().contains("12% probability"));
        assert!(result.interpretation().contains("NOT AT RISK"));
    }

    #[test]
    fn test_result_serialization() {
        let result = PredictionResult::new(0.42, pct(30));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["label"], "At Risk");
        assert_eq!(json["threshold"], 30);

        let back: PredictionResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.prediction_id, result.prediction_id);
        assert_eq!(back.threshold, result.threshold);
    }

    #[test]
    fn test_threshold_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Threshold>("150").is_err());
        assert_eq!(serde_json::from_str::<Threshold>("80").unwrap(), pct(80));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn raising_threshold_never_turns_not_at_risk_into_at_risk(
                probability in 0.0f64..=1.0,
                low in 0u32..=100,
                high in 0u32..=100,
            ) {
                let (low, high) = if low <= high { (low, high) } else { (high, low) };
                let at_low = RiskLabel::classify(probability, pct(low));
                let at_high = RiskLabel::classify(probability, pct(high));
                if !at_low.is_at_risk() {
                    prop_assert!(!at_high.is_at_risk());
                }
            }
        }
    }
}
