//! Patient record collected from the screening form.
//!
//! The record carries the 17 columns the heart disease pipeline was trained
//! on. Categorical columns are closed enums, so a value outside the trained
//! category set cannot be represented once parsing has succeeded.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Problems found while reading or validating a single field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("{field}: value is required")]
    Missing { field: &'static str },

    #[error("{field}: `{value}` is not a number")]
    InvalidNumber { field: &'static str, value: String },

    #[error("{field}: value must be finite")]
    NotFinite { field: &'static str },

    #[error("{field}: {value} is outside the allowed range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field}: `{value}` is not one of {expected:?}")]
    UnknownOption {
        field: &'static str,
        value: String,
        expected: &'static [&'static str],
    },

    #[error("malformed record: {0}")]
    Malformed(String),
}

/// One or more invalid fields in a submitted record.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid patient record: {}", join_errors(.errors))]
pub struct PatientError {
    pub errors: Vec<FieldError>,
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

macro_rules! categorical {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            /// Category labels in form order.
            pub const OPTIONS: &'static [&'static str] = &[$($label),+];

            /// The label the pipeline was trained on.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = FieldError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err(FieldError::UnknownOption {
                        field: stringify!($name),
                        value: other.to_string(),
                        expected: Self::OPTIONS,
                    }),
                }
            }
        }
    };
}

categorical! {
    /// Binary history/lifestyle answer.
    YesNo { Yes => "Yes", No => "No" }
}

categorical! {
    Sex { Male => "Male", Female => "Female" }
}

categorical! {
    /// Five-year age bracket.
    AgeCategory {
        Age18To24 => "18-24",
        Age25To29 => "25-29",
        Age30To34 => "30-34",
        Age35To39 => "35-39",
        Age40To44 => "40-44",
        Age45To49 => "45-49",
        Age50To54 => "50-54",
        Age55To59 => "55-59",
        Age60To64 => "60-64",
        Age65To69 => "65-69",
        Age70To74 => "70-74",
        Age75To79 => "75-79",
        Age80OrOlder => "80+",
    }
}

categorical! {
    Race {
        White => "White",
        Black => "Black",
        Asian => "Asian",
        AmericanIndianAlaskanNative => "American Indian/Alaskan Native",
        Other => "Other",
        Hispanic => "Hispanic",
    }
}

categorical! {
    Diabetic {
        Yes => "Yes",
        No => "No",
        Borderline => "No, borderline diabetes",
        DuringPregnancy => "Yes (during pregnancy)",
    }
}

categorical! {
    /// Self-reported general health.
    GenHealth {
        Poor => "Poor",
        Fair => "Fair",
        Good => "Good",
        VeryGood => "Very good",
        Excellent => "Excellent",
    }
}

/// Form section a field is shown in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    HealthMetrics,
    MedicalHistory,
}

impl FieldGroup {
    pub fn title(&self) -> &'static str {
        match self {
            FieldGroup::HealthMetrics => "Health Metrics",
            FieldGroup::MedicalHistory => "Medical History & Lifestyle",
        }
    }
}

/// Widget description for one field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Numeric { min: f64, max: f64, step: f64 },
    Categorical { options: &'static [&'static str] },
}

/// Declared schema of one form field / pipeline input column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldSpec {
    pub column: &'static str,
    pub label: &'static str,
    pub group: FieldGroup,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldSpec {
    const fn numeric(column: &'static str, label: &'static str, min: f64, max: f64, step: f64) -> Self {
        Self {
            column,
            label,
            group: FieldGroup::HealthMetrics,
            kind: FieldKind::Numeric { min, max, step },
        }
    }

    const fn categorical(
        column: &'static str,
        label: &'static str,
        options: &'static [&'static str],
    ) -> Self {
        Self {
            column,
            label,
            group: FieldGroup::MedicalHistory,
            kind: FieldKind::Categorical { options },
        }
    }

    /// Initial widget value: the lower bound for numbers, the first option otherwise.
    pub fn default_value(&self) -> String {
        match self.kind {
            FieldKind::Numeric { min, .. } => format!("{min}"),
            FieldKind::Categorical { options } => options[0].to_string(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, FieldKind::Numeric { .. })
    }
}

/// All form fields in display order. Column names match the training data.
pub const PATIENT_FIELDS: [FieldSpec; 17] = [
    FieldSpec::numeric("BMI", "BMI (Body Mass Index)", 10.0, 60.0, 0.1),
    FieldSpec::numeric("PhysicalHealth", "Physical Health (days unwell in past 30)", 0.0, 30.0, 1.0),
    FieldSpec::numeric("MentalHealth", "Mental Health (days unwell in past 30)", 0.0, 30.0, 1.0),
    FieldSpec::numeric("SleepTime", "Sleep Time (avg hours/day)", 0.0, 24.0, 0.5),
    FieldSpec::categorical("Smoking", "Smoking", YesNo::OPTIONS),
    FieldSpec::categorical("AlcoholDrinking", "Alcohol Drinking", YesNo::OPTIONS),
    FieldSpec::categorical("Stroke", "Stroke History", YesNo::OPTIONS),
    FieldSpec::categorical("DiffWalking", "Difficulty Walking", YesNo::OPTIONS),
    FieldSpec::categorical("Sex", "Sex", Sex::OPTIONS),
    FieldSpec::categorical("AgeCategory", "Age Category", AgeCategory::OPTIONS),
    FieldSpec::categorical("Race", "Race", Race::OPTIONS),
    FieldSpec::categorical("Diabetic", "Diabetic Status", Diabetic::OPTIONS),
    FieldSpec::categorical("PhysicalActivity", "Physical Activity", YesNo::OPTIONS),
    FieldSpec::categorical("GenHealth", "General Health", GenHealth::OPTIONS),
    FieldSpec::categorical("Asthma", "Asthma", YesNo::OPTIONS),
    FieldSpec::categorical("KidneyDisease", "Kidney Disease", YesNo::OPTIONS),
    FieldSpec::categorical("SkinCancer", "Skin Cancer", YesNo::OPTIONS),
];

/// Look up a field by column name.
pub fn field_spec(column: &str) -> Option<&'static FieldSpec> {
    PATIENT_FIELDS.iter().find(|f| f.column == column)
}

/// A field as published by the schema endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct FormField {
    #[serde(flatten)]
    pub spec: FieldSpec,
    pub group_title: &'static str,
    pub default: String,
}

/// Every field with its widget description and initial value, in form order.
pub fn form_schema() -> Vec<FormField> {
    PATIENT_FIELDS
        .iter()
        .map(|spec| FormField {
            spec: *spec,
            group_title: spec.group.title(),
            default: spec.default_value(),
        })
        .collect()
}

/// A single column value handed to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Category(&'static str),
}

/// Patient attributes for one screening request.
///
/// Serialized with the training column names so the JSON API and the
/// pipeline artifact share one vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatientRecord {
    #[serde(rename = "BMI")]
    pub bmi: f64,
    #[serde(rename = "PhysicalHealth")]
    pub physical_health: f64,
    #[serde(rename = "MentalHealth")]
    pub mental_health: f64,
    #[serde(rename = "SleepTime")]
    pub sleep_time: f64,
    #[serde(rename = "Smoking")]
    pub smoking: YesNo,
    #[serde(rename = "AlcoholDrinking")]
    pub alcohol_drinking: YesNo,
    #[serde(rename = "Stroke")]
    pub stroke: YesNo,
    #[serde(rename = "DiffWalking")]
    pub diff_walking: YesNo,
    #[serde(rename = "Sex")]
    pub sex: Sex,
    #[serde(rename = "AgeCategory")]
    pub age_category: AgeCategory,
    #[serde(rename = "Race")]
    pub race: Race,
    #[serde(rename = "Diabetic")]
    pub diabetic: Diabetic,
    #[serde(rename = "PhysicalActivity")]
    pub physical_activity: YesNo,
    #[serde(rename = "GenHealth")]
    pub gen_health: GenHealth,
    #[serde(rename = "Asthma")]
    pub asthma: YesNo,
    #[serde(rename = "KidneyDisease")]
    pub kidney_disease: YesNo,
    #[serde(rename = "SkinCancer")]
    pub skin_cancer: YesNo,
}

impl Default for PatientRecord {
    /// The record an untouched form submits.
    fn default() -> Self {
        Self {
            bmi: 10.0,
            physical_health: 0.0,
            mental_health: 0.0,
            sleep_time: 0.0,
            smoking: YesNo::Yes,
            alcohol_drinking: YesNo::Yes,
            stroke: YesNo::Yes,
            diff_walking: YesNo::Yes,
            sex: Sex::Male,
            age_category: AgeCategory::Age18To24,
            race: Race::White,
            diabetic: Diabetic::Yes,
            physical_activity: YesNo::Yes,
            gen_health: GenHealth::Poor,
            asthma: YesNo::Yes,
            kidney_disease: YesNo::Yes,
            skin_cancer: YesNo::Yes,
        }
    }
}

impl PatientRecord {
    /// Column values in [`PATIENT_FIELDS`] order.
    pub fn columns(&self) -> [(&'static str, FieldValue); 17] {
        use FieldValue::{Category, Number};
        [
            ("BMI", Number(self.bmi)),
            ("PhysicalHealth", Number(self.physical_health)),
            ("MentalHealth", Number(self.mental_health)),
            ("SleepTime", Number(self.sleep_time)),
            ("Smoking", Category(self.smoking.as_str())),
            ("AlcoholDrinking", Category(self.alcohol_drinking.as_str())),
            ("Stroke", Category(self.stroke.as_str())),
            ("DiffWalking", Category(self.diff_walking.as_str())),
            ("Sex", Category(self.sex.as_str())),
            ("AgeCategory", Category(self.age_category.as_str())),
            ("Race", Category(self.race.as_str())),
            ("Diabetic", Category(self.diabetic.as_str())),
            ("PhysicalActivity", Category(self.physical_activity.as_str())),
            ("GenHealth", Category(self.gen_health.as_str())),
            ("Asthma", Category(self.asthma.as_str())),
            ("KidneyDisease", Category(self.kidney_disease.as_str())),
            ("SkinCancer", Category(self.skin_cancer.as_str())),
        ]
    }

    /// Check every numeric field against its declared widget range.
    pub fn validate(&self) -> Result<(), PatientError> {
        let errors: Vec<FieldError> = self
            .columns()
            .iter()
            .zip(PATIENT_FIELDS.iter())
            .filter_map(|((_, value), spec)| match (value, spec.kind) {
                (FieldValue::Number(v), FieldKind::Numeric { min, max, .. }) => {
                    check_range(spec.column, *v, min, max).err()
                }
                _ => None,
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PatientError { errors })
        }
    }

    /// Build a record from submitted form values keyed by column name.
    ///
    /// Every field is checked against [`PATIENT_FIELDS`]; all problems are
    /// reported together.
    pub fn from_form(values: &HashMap<String, String>) -> Result<Self, PatientError> {
        let mut errors = Vec::new();
        let mut object = serde_json::Map::with_capacity(PATIENT_FIELDS.len());

        for spec in &PATIENT_FIELDS {
            match read_field(spec, values.get(spec.column).map(String::as_str)) {
                Ok(value) => {
                    object.insert(spec.column.to_string(), value);
                }
                Err(e) => errors.push(e),
            }
        }

        if !errors.is_empty() {
            return Err(PatientError { errors });
        }

        serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| PatientError {
            errors: vec![FieldError::Malformed(e.to_string())],
        })
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), FieldError> {
    if !value.is_finite() {
        return Err(FieldError::NotFinite { field });
    }
    if value < min || value > max {
        return Err(FieldError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn read_field(spec: &FieldSpec, raw: Option<&str>) -> Result<serde_json::Value, FieldError> {
    let field = spec.column;
    let raw = raw
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(FieldError::Missing { field })?;

    match spec.kind {
        FieldKind::Numeric { min, max, .. } => {
            let value = raw.parse::<f64>().map_err(|_| FieldError::InvalidNumber {
                field,
                value: raw.to_string(),
            })?;
            check_range(field, value, min, max)?;
            Ok(serde_json::Value::from(value))
        }
        FieldKind::Categorical { options } => {
            if options.contains(&raw) {
                Ok(serde_json::Value::from(raw))
            } else {
                Err(FieldError::UnknownOption {
                    field,
                    value: raw.to_string(),
                    expected: options,
                })
            }
        }
    }
}
