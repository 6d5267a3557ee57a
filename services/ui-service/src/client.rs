//! Relay from submitted form values to the prediction service.

use homelens_core::{zip_features, ExampleRow};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("model service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model service answered {status} ({}): {body}", outcome.as_deref().unwrap_or("unknown outcome"))]
    Status { status: u16, outcome: Option<String>, detail: Option<String>, body: String },
}

impl RelayError {
    /// Text shown on the form page. Only transport failures mean the service was unreachable.
    pub fn user_message(&self) -> &'static str {
        match self {
            RelayError::Http(_) => "the prediction service could not be reached.",
            RelayError::Status { outcome, .. } => match outcome.as_deref() {
                Some("not_ready") => "the prediction model is not loaded yet, please try again later.",
                Some("invalid_input") => "the prediction service rejected the submitted values.",
                Some("computation_error") => "the prediction could not be computed for these values.",
                _ => "the prediction service returned an unexpected error.",
            },
        }
    }

    /// Service-provided explanation, when the error body carried one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            RelayError::Status { detail, .. } => detail.as_deref(),
            RelayError::Http(_) => None,
        }
    }
}

/// Values as submitted by the form, one field per feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormValues {
    pub ocean_proximity: String,
    pub longitude: f64,
    pub latitude: f64,
    pub housing_median_age: i64,
    pub total_rooms: i64,
    pub total_bedrooms: i64,
    pub population: i64,
    pub households: i64,
    pub median_income: f64,
}

impl FormValues {
    /// Positional values in schema order.
    pub fn positional(&self) -> Vec<Value> {
        vec![
            json!(self.ocean_proximity),
            json!(self.longitude),
            json!(self.latitude),
            json!(self.housing_median_age),
            json!(self.total_rooms),
            json!(self.total_bedrooms),
            json!(self.population),
            json!(self.households),
            json!(self.median_income),
        ]
    }
}

/// Form values in positional schema order.
pub type FeatureTuple<'a> = (&'a str, f64, f64, i64, i64, i64, i64, i64, f64);

impl From<FeatureTuple<'_>> for FormValues {
    fn from(t: FeatureTuple<'_>) -> Self {
        Self {
            ocean_proximity: t.0.to_string(),
            longitude: t.1,
            latitude: t.2,
            housing_median_age: t.3,
            total_rooms: t.4,
            total_bedrooms: t.5,
            population: t.6,
            households: t.7,
            median_income: t.8,
        }
    }
}

impl From<&ExampleRow> for FormValues {
    fn from(row: &ExampleRow) -> Self {
        let [lon, lat, age, rooms, bedrooms, pop, households, income] = row.numeric;
        let t: FeatureTuple = (row.ocean_proximity.as_str(), lon, lat, age as i64, rooms as i64, bedrooms as i64, pop as i64, households as i64, income);
        t.into()
    }
}

pub struct PredictionClient {
    http: reqwest::Client,
    url: String,
}

impl PredictionClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url: url.into() })
    }

    pub fn url(&self) -> &str { &self.url }

    /// One POST, no retry. Non-2xx answers and timeouts are errors; a body without a
    /// numeric `prediction` yields `None`.
    pub async fn predict(&self, values: &FormValues) -> Result<Option<f64>, RelayError> {
        let payload = json!({ "features": zip_features(values.positional()) });
        let resp = self.http.post(&self.url).json(&payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            let field = |key: &str| parsed.get(key).and_then(Value::as_str).map(str::to_string);
            return Err(RelayError::Status { status: status.as_u16(), outcome: field("outcome"), detail: field("detail"), body });
        }
        let body: Value = resp.json().await?;
        let prediction = body.get("prediction").and_then(Value::as_f64);
        debug!(?prediction, "model service answered");
        Ok(prediction)
    }
}
