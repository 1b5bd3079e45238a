//! Request handlers

use crate::importance::{self, FeatureImportance, ImportanceError, ImportanceReport, WARNING_MESSAGE};
use crate::metrics::MetricsSnapshot;
use crate::models::inference::PredictError;
use crate::types::metadata::FeatureMetadata;
use crate::types::patient::{form_schema, FormField, PatientRecord};
use crate::types::prediction::{PredictionResult, Threshold, DISCLAIMER};
use crate::web::render::{self, FormState, Outcome, SHOW_IMPORTANCE_FIELD, THRESHOLD_FIELD};
use crate::web::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, warn};

/// JSON error body with an HTTP status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<PredictError> for ApiError {
    fn from(e: PredictError) -> Self {
        Self::new(status_for(&e), e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl From<ImportanceError> for ApiError {
    fn from(e: ImportanceError) -> Self {
        Self::new(importance_status(&e), e.to_string())
    }
}

/// A classifier without importances is a missing resource; anything else is a server fault.
fn importance_status(e: &ImportanceError) -> StatusCode {
    match e {
        ImportanceError::Unavailable { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn status_for(e: &PredictError) -> StatusCode {
    if e.is_input_error() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Run one prediction and account for it in the metrics.
fn score(
    state: &AppState,
    record: &PatientRecord,
    threshold: Threshold,
) -> Result<PredictionResult, PredictError> {
    let started = Instant::now();
    match state.engine.predict(record, threshold) {
        Ok(result) => {
            let elapsed = started.elapsed();
            state
                .metrics
                .record_prediction(elapsed, result.probability, result.label.is_at_risk());
            info!(
                prediction_id = %result.prediction_id,
                label = %result.label,
                probability = result.probability,
                latency_us = elapsed.as_micros() as u64,
                "Prediction served"
            );
            Ok(result)
        }
        Err(e) => {
            state.metrics.record_failure();
            warn!(error = %e, input_error = e.is_input_error(), "Prediction failed");
            Err(e)
        }
    }
}

fn importance_report(state: &AppState) -> ImportanceReport {
    let report = importance::report(
        &state.engine,
        &state.config.chart,
        state.config.detection.top_features,
    );
    if !report.is_chart() {
        state.metrics.record_importance_failure();
    }
    report
}

fn parse_threshold(raw: Option<&String>, default: Threshold) -> Result<Threshold, String> {
    let Some(raw) = raw.map(|r| r.trim()).filter(|r| !r.is_empty()) else {
        return Ok(default);
    };
    let percent: u32 = raw
        .parse()
        .map_err(|_| format!("threshold: `{}` is not a whole percentage", raw))?;
    Threshold::from_percent(percent).map_err(|e| e.to_string())
}

pub async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    pub show_importance: Option<String>,
}

/// Empty form; with `?show_importance=on` the importance section follows it.
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<IndexQuery>,
) -> Html<String> {
    let mut form = FormState::initial(
        state.default_threshold(),
        state.config.detection.top_features,
    );
    form.show_importance = query.show_importance.is_some();

    let importance = form.show_importance.then(|| importance_report(&state));
    Html(render::page(&form, None, importance.as_ref()))
}

/// Form submission: result panel (or error panel) under the re-rendered form.
pub async fn predict_form(
    State(state): State<AppState>,
    Form(values): Form<HashMap<String, String>>,
) -> (StatusCode, Html<String>) {
    let default = state.default_threshold();
    let threshold = parse_threshold(values.get(THRESHOLD_FIELD), default);
    let show_importance = values.contains_key(SHOW_IMPORTANCE_FIELD);

    let (status, outcome) = match (threshold.as_ref(), PatientRecord::from_form(&values)) {
        (Err(detail), _) => {
            state.metrics.record_failure();
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Outcome::Failure {
                    title: "Invalid input",
                    detail: detail.clone(),
                },
            )
        }
        (Ok(_), Err(e)) => {
            state.metrics.record_failure();
            warn!(error = %e, "Rejected form submission");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Outcome::Failure {
                    title: "Invalid input",
                    detail: e.to_string(),
                },
            )
        }
        (Ok(threshold), Ok(record)) => match score(&state, &record, *threshold) {
            Ok(result) => (StatusCode::OK, Outcome::Prediction(result)),
            Err(e) => (
                status_for(&e),
                Outcome::Failure {
                    title: if e.is_input_error() {
                        "Invalid input"
                    } else {
                        "Prediction failed"
                    },
                    detail: e.to_string(),
                },
            ),
        },
    };

    let importance = show_importance.then(|| importance_report(&state));
    let form = FormState {
        values,
        threshold: threshold.unwrap_or(default),
        show_importance,
        top_features: state.config.detection.top_features,
    };

    (
        status,
        Html(render::page(&form, Some(&outcome), importance.as_ref())),
    )
}

pub async fn importance_page(State(state): State<AppState>) -> Html<String> {
    Html(render::importance_page(&importance_report(&state)))
}

pub async fn importance_svg(State(state): State<AppState>) -> Response {
    let chart = importance::build_chart(
        &state.engine,
        &state.config.chart,
        state.config.detection.top_features,
    );
    match chart {
        Ok((svg, _)) => ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
        Err(e) => {
            state.metrics.record_importance_failure();
            warn!(error = %e, "{}", WARNING_MESSAGE);
            (importance_status(&e), format!("{}\n{}", WARNING_MESSAGE, e)).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictRequest {
    pub patient: PatientRecord,
    #[serde(default)]
    pub threshold_percent: Option<Threshold>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    pub result: PredictionResult,
    pub confidence: String,
    pub threshold_used: String,
    pub interpretation: String,
    pub disclaimer: &'static str,
}

impl From<PredictionResult> for PredictResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            confidence: result.confidence_display(),
            threshold_used: result.threshold_display(),
            interpretation: result.interpretation(),
            disclaimer: DISCLAIMER,
            result,
        }
    }
}

pub async fn api_predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(request) = payload.inspect_err(|_| state.metrics.record_failure())?;
    let threshold = request
        .threshold_percent
        .unwrap_or_else(|| state.default_threshold());

    let result = score(&state, &request.patient, threshold)?;
    Ok(Json(result.into()))
}

#[derive(Debug, Deserialize)]
pub struct ImportanceQuery {
    pub top: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ImportanceResponse {
    pub classifier: &'static str,
    pub features: Vec<FeatureImportance>,
}

pub async fn api_importance(
    State(state): State<AppState>,
    Query(query): Query<ImportanceQuery>,
) -> Result<Json<ImportanceResponse>, ApiError> {
    let top = query.top.unwrap_or(state.config.detection.top_features);
    let features = importance::top_features(&state.engine, top).map_err(|e| {
        state.metrics.record_importance_failure();
        warn!(error = %e, "{}", WARNING_MESSAGE);
        e
    })?;

    Ok(Json(ImportanceResponse {
        classifier: state.engine.classifier_name(),
        features,
    }))
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub fields: Vec<FormField>,
    pub threshold: ThresholdSchema,
    pub classifier: &'static str,
    pub transformed_features: usize,
    pub metadata: FeatureMetadata,
}

#[derive(Debug, Serialize)]
pub struct ThresholdSchema {
    pub min: u8,
    pub max: u8,
    pub step: u8,
    pub default: Threshold,
}

pub async fn api_schema(State(state): State<AppState>) -> Json<SchemaResponse> {
    Json(SchemaResponse {
        fields: form_schema(),
        threshold: ThresholdSchema {
            min: 0,
            max: Threshold::MAX_PERCENT,
            step: 1,
            default: state.default_threshold(),
        },
        classifier: state.engine.classifier_name(),
        transformed_features: state.engine.pipeline().preprocessor().output_width(),
        metadata: state.engine.metadata().clone(),
    })
}

pub async fn api_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
