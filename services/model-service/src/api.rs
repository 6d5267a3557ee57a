//! HTTP surface of the prediction service.
//!
//! `POST /predict` always answers with a `prediction` field; on failure it carries the
//! `-1.0` sentinel while `outcome` and the status code say which failure it was.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use homelens_core::{FeatureRecord, SchemaError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::artifacts::{ArtifactStatus, Artifacts};
use crate::metrics::Metrics;
use crate::model::inverse_log1p;

pub const SENTINEL: f64 = -1.0;

#[derive(Clone)]
pub struct AppState {
    pub artifacts: Arc<Artifacts>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(artifacts: Arc<Artifacts>) -> Result<Self, prometheus::Error> {
        Ok(Self { artifacts, metrics: Arc::new(Metrics::new()?) })
    }
}

#[derive(Debug, Deserialize)]
pub struct InferenceRequest {
    #[serde(default)]
    pub features: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    InvalidInput,
    NotReady,
    ComputationError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::InvalidInput => "invalid_input",
            Outcome::NotReady => "not_ready",
            Outcome::ComputationError => "computation_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub prediction: f64,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] SchemaError),
    #[error("invalid input: malformed request body: {0}")]
    MalformedBody(String),
    #[error("model or pipeline not loaded")]
    NotReady,
    #[error("prediction failed: {0}")]
    Computation(String),
}

impl PredictError {
    pub fn outcome(&self) -> Outcome {
        match self {
            PredictError::InvalidInput(_) | PredictError::MalformedBody(_) => Outcome::InvalidInput,
            PredictError::NotReady => Outcome::NotReady,
            PredictError::Computation(_) => Outcome::ComputationError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::InvalidInput(_) | PredictError::MalformedBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PredictError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            PredictError::Computation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let body = InferenceResponse { prediction: SENTINEL, outcome: self.outcome(), detail: Some(self.to_string()) };
        (self.status(), Json(body)).into_response()
    }
}

/// Pipeline, model and inverse transform for one request. Blocking; callers on the async
/// runtime go through `spawn_blocking`.
pub fn predict(artifacts: &Artifacts, features: &Map<String, Value>) -> Result<f64, PredictError> {
    if features.is_empty() { return Err(SchemaError::Empty.into()); }
    let (Some(model), Some(pipeline)) = (&artifacts.model, &artifacts.pipeline) else {
        return Err(PredictError::NotReady);
    };
    let record = FeatureRecord::from_map(features)?;
    let row = pipeline.handle.transform(&record).map_err(|e| PredictError::Computation(e.to_string()))?;
    let raw = model.handle.predict(&row).map_err(|e| PredictError::Computation(format!("{e:#}")))?;
    let value = inverse_log1p(raw);
    if !value.is_finite() { return Err(PredictError::Computation(format!("non-finite prediction from raw output {raw}"))); }
    Ok(value)
}

async fn predict_handler(
    State(state): State<AppState>,
    payload: Result<Json<InferenceRequest>, JsonRejection>,
) -> Result<Json<InferenceResponse>, PredictError> {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            state.metrics.predictions.with_label_values(&[Outcome::InvalidInput.as_str()]).inc();
            debug!(error = %rejection.body_text(), "rejected malformed prediction body");
            return Err(PredictError::MalformedBody(rejection.body_text()));
        }
    };
    let artifacts = state.artifacts.clone();
    let timer = state.metrics.inference_seconds.start_timer();
    let result = tokio::task::spawn_blocking(move || predict(&artifacts, &req.features))
        .await
        .unwrap_or_else(|e| Err(PredictError::Computation(format!("inference task failed: {e}"))));
    timer.observe_duration();
    let outcome = result.as_ref().map_or_else(PredictError::outcome, |_| Outcome::Ok);
    state.metrics.predictions.with_label_values(&[outcome.as_str()]).inc();
    match result {
        Ok(prediction) => {
            debug!(prediction, "prediction served");
            Ok(Json(InferenceResponse { prediction, outcome, detail: None }))
        }
        Err(e) => {
            match &e {
                PredictError::Computation(_) => error!(error = %e, "error during prediction"),
                PredictError::NotReady => warn!("prediction requested before artifacts loaded"),
                PredictError::InvalidInput(_) | PredictError::MalformedBody(_) => debug!(error = %e, "rejected prediction input"),
            }
            Err(e)
        }
    }
}

async fn live() -> Json<Value> { Json(json!({ "live": true })) }

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let ready = state.artifacts.ready();
    let code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(json!({ "ready": ready })))
}

async fn status(State(state): State<AppState>) -> Json<ArtifactStatus> { Json(state.artifacts.status()) }

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(text) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response(),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/live", get(live))
        .route("/ready", get(ready))
        .route("/status", get(status))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
