//! Client for the MLflow model registry and tracking API.
//!
//! Only the calls HomeLens needs are covered: alias/version lookup, run search, version
//! registration, alias mutation and artifact download. `RegistryApi` is the seam the
//! services and the promoter are written against.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, de::IgnoredAny, Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::config::RegistryConfig;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid model uri {0:?}")]
    InvalidUri(String),
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("registry returned {status} {code}: {message}")]
    Api { status: u16, code: String, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unexpected registry response: {0}")]
    Decode(String),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound(_)) }
}

/// `models:/<name>@<alias>` or `models:/<name>/<version>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelUri {
    Alias { name: String, alias: String },
    Version { name: String, version: String },
}

impl ModelUri {
    pub fn name(&self) -> &str {
        match self { Self::Alias { name, .. } | Self::Version { name, .. } => name }
    }
}

impl FromStr for ModelUri {
    type Err = RegistryError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RegistryError::InvalidUri(s.to_string());
        let rest = s.strip_prefix("models:/").ok_or_else(invalid)?;
        if let Some((name, alias)) = rest.split_once('@') {
            if name.is_empty() || alias.is_empty() || alias.contains('/') { return Err(invalid()); }
            return Ok(Self::Alias { name: name.into(), alias: alias.into() });
        }
        match rest.split_once('/') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()) => {
                Ok(Self::Version { name: name.into(), version: version.into() })
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alias { name, alias } => write!(f, "models:/{name}@{alias}"),
            Self::Version { name, version } => write!(f, "models:/{name}/{version}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    #[serde(default)]
    pub artifact_location: Option<String>,
    #[serde(default)]
    pub lifecycle_stage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    #[serde(default)]
    pub artifact_uri: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric { pub key: String, pub value: f64 }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunData {
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub info: RunInfo,
    #[serde(default)]
    pub data: RunData,
}

impl Run {
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.data.metrics.iter().find(|m| m.key == key).map(|m| m.value)
    }
}

/// Body of `runs/search`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSearch {
    pub experiment_ids: Vec<String>,
    pub filter: String,
    pub order_by: Vec<String>,
    pub max_results: u32,
}

impl RunSearch {
    /// Best run by `metric`, ignoring runs where it is not positive.
    pub fn top_by_metric(experiment_id: &str, metric: &str) -> Self {
        Self {
            experiment_ids: vec![experiment_id.to_string()],
            filter: format!("metrics.{metric} > 0"),
            order_by: vec![format!("metrics.{metric} DESC")],
            max_results: 1,
        }
    }
}

#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn get_model_version_by_alias(&self, name: &str, alias: &str) -> Result<ModelVersion, RegistryError>;
    async fn get_model_version(&self, name: &str, version: &str) -> Result<ModelVersion, RegistryError>;
    async fn get_experiment_by_name(&self, name: &str) -> Result<Experiment, RegistryError>;
    async fn search_runs(&self, search: &RunSearch) -> Result<Vec<Run>, RegistryError>;
    async fn delete_alias(&self, name: &str, alias: &str) -> Result<(), RegistryError>;
    async fn create_model_version(&self, name: &str, source: &str, run_id: &str) -> Result<ModelVersion, RegistryError>;
    async fn set_alias(&self, name: &str, alias: &str, version: &str) -> Result<(), RegistryError>;
    async fn download_artifact(&self, version: &ModelVersion, path: &str) -> Result<Bytes, RegistryError>;

    async fn resolve(&self, uri: &ModelUri) -> Result<ModelVersion, RegistryError> {
        match uri {
            ModelUri::Alias { name, alias } => self.get_model_version_by_alias(name, alias).await,
            ModelUri::Version { name, version } => self.get_model_version(name, version).await,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ModelVersionEnvelope { model_version: ModelVersion }

#[derive(Deserialize)]
struct ExperimentEnvelope { experiment: Experiment }

#[derive(Deserialize)]
struct RunsEnvelope {
    #[serde(default)]
    runs: Vec<Run>,
}

/// REST client for an MLflow tracking server using HTTP basic auth.
/// The tracking server answers an unset alias with `INVALID_PARAMETER_VALUE` (400) and a
/// "Registered model alias ... not found." message rather than a 404.
fn is_missing_alias(body: &ApiErrorBody) -> bool {
    let message = body.message.to_ascii_lowercase();
    body.error_code == "INVALID_PARAMETER_VALUE" && message.contains("alias") && message.contains("not found")
}

#[derive(Clone)]
pub struct MlflowClient {
    http: reqwest::Client,
    base: String,
    username: String,
    password: String,
}

impl MlflowClient {
    pub fn new(cfg: &RegistryConfig) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("homelens/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base: cfg.tracking_uri.trim_end_matches('/').to_string(),
            username: cfg.username.clone(),
            password: cfg.password().to_string(),
        })
    }

    fn api(&self, endpoint: &str) -> String { format!("{}/api/2.0/mlflow/{endpoint}", self.base) }

    async fn send(&self, req: RequestBuilder) -> Result<Response, RegistryError> {
        let resp = req.basic_auth(&self.username, Some(&self.password)).send().await?;
        let status = resp.status();
        if status.is_success() { return Ok(resp); }
        let body: ApiErrorBody = resp.json().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND || body.error_code == "RESOURCE_DOES_NOT_EXIST" || is_missing_alias(&body) {
            let message = if body.message.is_empty() { status.to_string() } else { body.message };
            return Err(RegistryError::NotFound(message));
        }
        Err(RegistryError::Api { status: status.as_u16(), code: body.error_code, message: body.message })
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, RegistryError> {
        let text = self.send(req).await?.text().await?;
        let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| RegistryError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RegistryApi for MlflowClient {
    async fn get_model_version_by_alias(&self, name: &str, alias: &str) -> Result<ModelVersion, RegistryError> {
        debug!(name, alias, "resolving model alias");
        let req = self.http.get(self.api("registered-models/alias")).query(&[("name", name), ("alias", alias)]);
        Ok(self.send_json::<ModelVersionEnvelope>(req).await?.model_version)
    }

    async fn get_model_version(&self, name: &str, version: &str) -> Result<ModelVersion, RegistryError> {
        let req = self.http.get(self.api("model-versions/get")).query(&[("name", name), ("version", version)]);
        Ok(self.send_json::<ModelVersionEnvelope>(req).await?.model_version)
    }

    async fn get_experiment_by_name(&self, name: &str) -> Result<Experiment, RegistryError> {
        let req = self.http.get(self.api("experiments/get-by-name")).query(&[("experiment_name", name)]);
        Ok(self.send_json::<ExperimentEnvelope>(req).await?.experiment)
    }

    async fn search_runs(&self, search: &RunSearch) -> Result<Vec<Run>, RegistryError> {
        let req = self.http.post(self.api("runs/search")).json(search);
        Ok(self.send_json::<RunsEnvelope>(req).await?.runs)
    }

    async fn delete_alias(&self, name: &str, alias: &str) -> Result<(), RegistryError> {
        let req = self.http.delete(self.api("registered-models/alias")).json(&json!({ "name": name, "alias": alias }));
        self.send_json::<IgnoredAny>(req).await?;
        Ok(())
    }

    async fn create_model_version(&self, name: &str, source: &str, run_id: &str) -> Result<ModelVersion, RegistryError> {
        let req = self.http.post(self.api("model-versions/create")).json(&json!({ "name": name, "source": source, "run_id": run_id }));
        Ok(self.send_json::<ModelVersionEnvelope>(req).await?.model_version)
    }

    async fn set_alias(&self, name: &str, alias: &str, version: &str) -> Result<(), RegistryError> {
        let req = self.http.post(self.api("registered-models/alias")).json(&json!({ "name": name, "alias": alias, "version": version }));
        self.send_json::<IgnoredAny>(req).await?;
        Ok(())
    }

    async fn download_artifact(&self, version: &ModelVersion, path: &str) -> Result<Bytes, RegistryError> {
        debug!(name = %version.name, version = %version.version, path, "downloading model artifact");
        let req = self.http
            .get(format!("{}/model-versions/get-artifact", self.base))
            .query(&[("name", version.name.as_str()), ("version", version.version.as_str()), ("path", path)]);
        Ok(self.send(req).await?.bytes().await?)
    }
}
