//! Startup-time artifact loading.
//!
//! The model and the pipeline load independently: either may fail without affecting the
//! other, and the service starts regardless. The resulting `Artifacts` value is never
//! mutated afterwards and is shared by reference across handlers.

use anyhow::{Context, Result};
use homelens_core::{ModelUri, RegistryApi};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::ArtifactSources;
use crate::model::{OnnxRegressor, Regressor};
use crate::pipeline::Pipeline;

pub struct Loaded<T: ?Sized> {
    pub handle: Arc<T>,
    pub version: String,
}

#[derive(Default)]
pub struct Artifacts {
    pub model: Option<Loaded<dyn Regressor>>,
    pub pipeline: Option<Loaded<Pipeline>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactStatus {
    pub ready: bool,
    pub model_version: Option<String>,
    pub pipeline_version: Option<String>,
}

impl Artifacts {
    pub fn new(model: Option<Loaded<dyn Regressor>>, pipeline: Option<Loaded<Pipeline>>) -> Self { Self { model, pipeline } }

    /// Both artifacts present; the only state that can produce a real prediction.
    pub fn ready(&self) -> bool { self.model.is_some() && self.pipeline.is_some() }

    pub fn status(&self) -> ArtifactStatus {
        ArtifactStatus {
            ready: self.ready(),
            model_version: self.model.as_ref().map(|m| m.version.clone()),
            pipeline_version: self.pipeline.as_ref().map(|p| p.version.clone()),
        }
    }

    pub async fn load(registry: &dyn RegistryApi, sources: &ArtifactSources) -> Self {
        // Pipeline first: its width stands in for a symbolic model feature axis.
        let pipeline = match load_pipeline(registry, &sources.pipeline_uri, &sources.pipeline_artifact).await {
            Ok(p) => {
                info!(uri = %sources.pipeline_uri, version = %p.version, width = p.handle.width(), "pipeline loaded");
                Some(p)
            }
            Err(e) => {
                error!(uri = %sources.pipeline_uri, error = %format!("{e:#}"), "failed to load pipeline");
                None
            }
        };
        let width = pipeline.as_ref().map(|p| p.handle.width());
        let model = match load_model(registry, &sources.model_uri, &sources.model_artifact, width).await {
            Ok(m) => {
                info!(uri = %sources.model_uri, version = %m.version, width = m.handle.input_width(), "model loaded");
                Some(m)
            }
            Err(e) => {
                error!(uri = %sources.model_uri, error = %format!("{e:#}"), "failed to load model");
                None
            }
        };
        Self::reconciled(model, pipeline)
    }

    /// Drops the model when its input width differs from the pipeline's output width;
    /// such a pair could never serve a prediction.
    pub fn reconciled(model: Option<Loaded<dyn Regressor>>, pipeline: Option<Loaded<Pipeline>>) -> Self {
        let model = match (model, &pipeline) {
            (Some(m), Some(p)) if m.handle.input_width() != p.handle.width() => {
                error!(
                    model_version = %m.version,
                    pipeline_version = %p.version,
                    model_width = m.handle.input_width(),
                    pipeline_width = p.handle.width(),
                    "model and pipeline widths disagree, leaving the model unloaded"
                );
                None
            }
            (model, _) => model,
        };
        Self { model, pipeline }
    }
}

async fn load_pipeline(registry: &dyn RegistryApi, uri: &ModelUri, artifact: &str) -> Result<Loaded<Pipeline>> {
    let mv = registry.resolve(uri).await.with_context(|| format!("resolving {uri}"))?;
    let bytes = registry.download_artifact(&mv, artifact).await.with_context(|| format!("downloading {artifact} from {uri}"))?;
    let pipeline = Pipeline::from_json(&bytes)?;
    Ok(Loaded { handle: Arc::new(pipeline), version: mv.version })
}

async fn load_model(registry: &dyn RegistryApi, uri: &ModelUri, artifact: &str, width: Option<usize>) -> Result<Loaded<dyn Regressor>> {
    let mv = registry.resolve(uri).await.with_context(|| format!("resolving {uri}"))?;
    let bytes = registry.download_artifact(&mv, artifact).await.with_context(|| format!("downloading {artifact} from {uri}"))?;
    let regressor = tokio::task::spawn_blocking(move || OnnxRegressor::from_bytes(&bytes, width))
        .await
        .context("model load task panicked")??;
    let handle: Arc<dyn Regressor> = Arc::new(regressor);
    Ok(Loaded { handle, version: mv.version })
}
