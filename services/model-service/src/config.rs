use config::Map;
use homelens_core::config::{builder, service_env, ConfigError};
use homelens_core::{ModelUri, RegistryConfig};
use serde::Deserialize;
use std::net::SocketAddr;

pub const SERVICE: &str = "model-service";

#[derive(Debug, Deserialize)]
struct Raw {
    bind_addr: String,
    model_uri: String,
    pipeline_uri: String,
    model_artifact: String,
    pipeline_artifact: String,
}

/// Where each artifact lives in the registry and which file inside the version to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSources {
    pub model_uri: ModelUri,
    pub model_artifact: String,
    pub pipeline_uri: ModelUri,
    pub pipeline_artifact: String,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub artifacts: ArtifactSources,
    pub registry: RegistryConfig,
}

impl ServiceConfig {
    pub fn load() -> Result<Self, ConfigError> { Self::from_vars(None) }

    pub fn from_vars(vars: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        let cfg = builder(SERVICE)?
            .set_default("bind_addr", "0.0.0.0:7860")?
            .set_default("model_uri", "models:/homelens-ca-model@champion")?
            .set_default("pipeline_uri", "models:/homelens-ca-pipeline@champion")?
            .set_default("model_artifact", "model.onnx")?
            .set_default("pipeline_artifact", "pipeline.json")?
            .add_source(service_env(vars.clone()))
            .build()?;
        let raw: Raw = cfg.try_deserialize()?;
        let bind_addr = raw.bind_addr.parse().map_err(|e| ConfigError::Invalid { key: "HOMELENS_BIND_ADDR", reason: format!("{e}") })?;
        let model_uri = raw.model_uri.parse().map_err(|e| ConfigError::Invalid { key: "HOMELENS_MODEL_URI", reason: format!("{e}") })?;
        let pipeline_uri = raw.pipeline_uri.parse().map_err(|e| ConfigError::Invalid { key: "HOMELENS_PIPELINE_URI", reason: format!("{e}") })?;
        Ok(Self {
            bind_addr,
            artifacts: ArtifactSources { model_uri, model_artifact: raw.model_artifact, pipeline_uri, pipeline_artifact: raw.pipeline_artifact },
            registry: RegistryConfig::from_vars(vars)?,
        })
    }
}
