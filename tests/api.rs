//! End-to-end tests driving the router in-process.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use heart_risk_predictor::config::AppConfig;
use heart_risk_predictor::models::loader::{LoadedArtifacts, ModelLoader};
use heart_risk_predictor::models::pipeline::Pipeline;
use heart_risk_predictor::types::patient::{AgeCategory, Diabetic, FieldValue, GenHealth, Sex, YesNo};
use heart_risk_predictor::types::FeatureMetadata;
use heart_risk_predictor::web::{router, AppState};
use heart_risk_predictor::{InferenceEngine, PatientRecord};
use serde_json::{json, Value};
use std::path::Path;
use tower::ServiceExt;

fn demo_state() -> AppState {
    let models = Path::new(env!("CARGO_MANIFEST_DIR")).join("models");
    let artifacts = ModelLoader::new(models).load().unwrap();
    let engine = InferenceEngine::from_artifacts(artifacts).unwrap();
    AppState::new(engine, AppConfig::default())
}

fn state_for(classifier: Value) -> AppState {
    state_with_config(classifier, AppConfig::default())
}

fn state_with_config(classifier: Value, config: AppConfig) -> AppState {
    let artifact = serde_json::from_value(json!({
        "preprocessor": {"transformers": [
            {"name": "num", "kind": "passthrough", "columns": ["BMI"]}
        ]},
        "classifier": classifier
    }))
    .unwrap();
    let pipeline = Pipeline::from_artifact(artifact, Path::new("."), 1).unwrap();
    let engine = InferenceEngine::from_artifacts(LoadedArtifacts {
        pipeline,
        metadata: FeatureMetadata::default(),
    })
    .unwrap();
    AppState::new(engine, config)
}

/// Always answers 0.73.
fn fixed_state() -> AppState {
    state_for(json!({
        "kind": "random_forest",
        "trees": [{"nodes": [{"value": 0.73}]}],
        "feature_importances": [1.0]
    }))
}

/// A classifier without feature importances.
fn logistic_state() -> AppState {
    state_for(json!({"kind": "logistic_regression", "coef": [0.05], "intercept": -3.0}))
}

fn healthy_patient() -> PatientRecord {
    PatientRecord {
        bmi: 23.0,
        sleep_time: 7.5,
        smoking: YesNo::No,
        alcohol_drinking: YesNo::No,
        stroke: YesNo::No,
        diff_walking: YesNo::No,
        sex: Sex::Female,
        age_category: AgeCategory::Age30To34,
        diabetic: Diabetic::No,
        gen_health: GenHealth::Excellent,
        asthma: YesNo::No,
        kidney_disease: YesNo::No,
        skin_cancer: YesNo::No,
        ..PatientRecord::default()
    }
}

fn high_risk_patient() -> PatientRecord {
    PatientRecord {
        sex: Sex::Male,
        age_category: AgeCategory::Age80OrOlder,
        stroke: YesNo::Yes,
        gen_health: GenHealth::Poor,
        diabetic: Diabetic::Yes,
        smoking: YesNo::Yes,
        diff_walking: YesNo::Yes,
        ..healthy_patient()
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn get(state: &AppState, uri: &str) -> (StatusCode, String) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(router(state.clone()), request).await
}

async fn post_json(state: &AppState, uri: &str, body: Value) -> (StatusCode, String) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router(state.clone()), request).await
}

fn percent_encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

fn form_body(record: &PatientRecord, extra: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = record
        .columns()
        .iter()
        .map(|(column, value)| {
            let text = match value {
                FieldValue::Number(v) => v.to_string(),
                FieldValue::Category(c) => c.to_string(),
            };
            (column.to_string(), text)
        })
        .collect();
    pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

async fn post_form(state: &AppState, body: String) -> (StatusCode, String) {
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap();
    send(router(state.clone()), request).await
}

fn parse(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get(&fixed_state(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_index_renders_form() {
    let (status, body) = get(&demo_state(), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Enter Patient Details"));
    assert!(body.contains("Check Risk"));
    assert!(!body.contains("Prediction Result"));
    assert!(body.contains("Show top 10 important features"));
    assert!(body.contains(r#"href="/importance""#));
    assert!(!body.contains("id=\"importance\""));
}

#[tokio::test]
async fn test_index_shows_importance_without_prediction() {
    let state = demo_state();
    let (status, html) = get(&state, "/?show_importance=on").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Enter Patient Details"));
    assert!(html.contains("<svg"));
    assert!(html.contains("Top 10 Most Important Features"));
    assert!(html.contains("GenHealth_Poor"));
    assert!(!html.contains("Prediction Result"));
    // The predict form carries the toggle forward.
    assert!(html.contains(r#"<input type="hidden" name="show_importance" value="on">"#));

    let (_, metrics) = get(&state, "/api/metrics").await;
    let metrics = parse(&metrics);
    assert_eq!(metrics["predictions_served"], 0);
    assert_eq!(metrics["importance_failures"], 0);
}

#[tokio::test]
async fn test_api_predict_at_default_threshold() {
    let state = fixed_state();
    let (status, body) = post_json(
        &state,
        "/api/predict",
        json!({"patient": PatientRecord::default()}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let body = parse(&body);
    assert_eq!(body["label"], "At Risk");
    assert_eq!(body["probability"], 0.73);
    assert_eq!(body["confidence"], "73.00%");
    assert_eq!(body["threshold"], 50);
    assert_eq!(body["threshold_used"], "0.50");
    assert!(body["interpretation"]
        .as_str()
        .unwrap()
        .contains("73% probability that this patient may be AT RISK"));
    assert!(body["prediction_id"].as_str().is_some());
}

#[tokio::test]
async fn test_api_predict_threshold_changes_label() {
    let state = fixed_state();
    let patient = PatientRecord::default();

    let (_, high) = post_json(
        &state,
        "/api/predict",
        json!({"patient": patient, "threshold_percent": 80}),
    )
    .await;
    assert_eq!(parse(&high)["label"], "Not At Risk");

    // Probability equal to the threshold counts as at risk.
    let (_, boundary) = post_json(
        &state,
        "/api/predict",
        json!({"patient": patient, "threshold_percent": 73}),
    )
    .await;
    assert_eq!(parse(&boundary)["label"], "At Risk");
}

#[tokio::test]
async fn test_api_predict_rejects_invalid_input() {
    let state = fixed_state();

    let mut patient = serde_json::to_value(PatientRecord::default()).unwrap();
    patient["AgeCategory"] = json!("90+");
    let (status, _) = post_json(&state, "/api/predict", json!({ "patient": patient })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let out_of_range = PatientRecord {
        bmi: 75.0,
        ..PatientRecord::default()
    };
    let (status, body) = post_json(&state, "/api/predict", json!({ "patient": out_of_range })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(parse(&body)["error"].as_str().unwrap().contains("BMI"));

    let (status, _) = post_json(
        &state,
        "/api/predict",
        json!({"patient": PatientRecord::default(), "threshold_percent": 150}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, metrics) = get(&state, "/api/metrics").await;
    let metrics = parse(&metrics);
    assert_eq!(metrics["prediction_failures"], 3);
    assert_eq!(metrics["predictions_served"], 0);
}

#[tokio::test]
async fn test_demo_model_separates_patients() {
    let state = demo_state();

    let (status, healthy) =
        post_json(&state, "/api/predict", json!({ "patient": healthy_patient() })).await;
    assert_eq!(status, StatusCode::OK);
    let (_, sick) = post_json(&state, "/api/predict", json!({ "patient": high_risk_patient() })).await;

    let healthy = parse(&healthy);
    let sick = parse(&sick);
    assert_eq!(healthy["label"], "Not At Risk");
    assert_eq!(sick["label"], "At Risk");
    assert!(sick["probability"].as_f64().unwrap() > healthy["probability"].as_f64().unwrap());
}

#[tokio::test]
async fn test_demo_model_is_deterministic() {
    let state = demo_state();
    let request = json!({ "patient": high_risk_patient() });

    let (_, first) = post_json(&state, "/api/predict", request.clone()).await;
    let (_, second) = post_json(&state, "/api/predict", request).await;
    assert_eq!(parse(&first)["probability"], parse(&second)["probability"]);
}

#[tokio::test]
async fn test_form_submission_with_importance_chart() {
    let state = demo_state();
    let body = form_body(
        &healthy_patient(),
        &[("threshold", "50"), ("show_importance", "on")],
    );

    let (status, html) = post_form(&state, body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Prediction Result"));
    assert!(html.contains("Not At Risk"));
    assert!(html.contains("Threshold Used: 0.50"));
    assert!(html.contains("<svg"));
    assert!(html.contains("Top 10 Most Important Features"));
    // Submitted values are kept in the form.
    assert!(html.contains(r#"<option value="30-34" selected>"#));
}

#[tokio::test]
async fn test_form_importance_warning_keeps_result() {
    let state = logistic_state();
    let body = form_body(
        &PatientRecord::default(),
        &[("threshold", "50"), ("show_importance", "on")],
    );

    let (status, html) = post_form(&state, body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Prediction Result"));
    assert!(html.contains("Could not display feature importance."));
    assert!(html.contains("logistic_regression"));
    assert!(!html.contains("<svg"));

    let (_, metrics) = get(&state, "/api/metrics").await;
    assert_eq!(parse(&metrics)["importance_failures"], 1);
}

#[tokio::test]
async fn test_form_rejects_bad_number() {
    let body = form_body(&PatientRecord::default(), &[("threshold", "50")]).replace("BMI=10", "BMI=abc");

    let (status, html) = post_form(&fixed_state(), body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(html.contains("Invalid input"));
    assert!(html.contains("`abc` is not a number"));
}

#[tokio::test]
async fn test_form_without_importance_checkbox() {
    let body = form_body(&PatientRecord::default(), &[("threshold", "80")]);

    let (status, html) = post_form(&fixed_state(), body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Not At Risk"));
    assert!(html.contains("<code>73.00%</code>"));
    assert!(!html.contains("id=\"importance\""));
}

#[tokio::test]
async fn test_importance_svg() {
    let (status, svg) = get(&demo_state(), "/importance.svg").await;
    assert_eq!(status, StatusCode::OK);
    assert!(svg.contains("GenHealth_Poor"));

    let (status, body) = get(&logistic_state(), "/importance.svg").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.starts_with("Could not display feature importance."));
}

#[tokio::test]
async fn test_importance_svg_chart_failure_is_server_error() {
    let mut config = AppConfig::default();
    config.detection.top_features = 0;
    let state = state_with_config(
        json!({
            "kind": "random_forest",
            "trees": [{"nodes": [{"value": 0.73}]}],
            "feature_importances": [1.0]
        }),
        config,
    );
    let (status, body) = get(&state, "/importance.svg").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.starts_with("Could not display feature importance."));
    assert!(body.contains("no features to plot"));

    let (_, metrics) = get(&state, "/api/metrics").await;
    assert_eq!(parse(&metrics)["importance_failures"], 1);
}

#[tokio::test]
async fn test_importance_page() {
    let (status, html) = get(&logistic_state(), "/importance").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Could not display feature importance."));
}

#[tokio::test]
async fn test_api_importance() {
    let state = demo_state();

    let (status, body) = get(&state, "/api/importance").await;
    assert_eq!(status, StatusCode::OK);
    let body = parse(&body);
    let features = body["features"].as_array().unwrap();
    assert_eq!(features.len(), 10);
    assert_eq!(features[0]["feature"], "GenHealth_Poor");
    assert_eq!(body["classifier"], "gradient_boosting");

    let (_, top3) = get(&state, "/api/importance?top=3").await;
    assert_eq!(parse(&top3)["features"].as_array().unwrap().len(), 3);

    let (status, _) = get(&logistic_state(), "/api/importance").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_schema() {
    let (status, body) = get(&demo_state(), "/api/schema").await;
    assert_eq!(status, StatusCode::OK);

    let body = parse(&body);
    assert_eq!(body["fields"].as_array().unwrap().len(), 17);
    assert_eq!(body["transformed_features"], 50);
    assert_eq!(body["threshold"]["default"], 50);
    assert_eq!(body["metadata"]["target"], "HeartDisease");
}
