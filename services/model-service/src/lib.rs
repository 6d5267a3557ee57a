//! HomeLens CA prediction service: median house value for a California housing block,
//! computed by a registry-managed preprocessing pipeline and regression model.

use anyhow::{Context, Result};
use homelens_core::MlflowClient;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub mod api;
pub mod artifacts;
pub mod config;
pub mod metrics;
pub mod model;
pub mod pipeline;

use crate::api::AppState;
use crate::artifacts::Artifacts;
use crate::config::ServiceConfig;

/// Loads artifacts, then serves until ctrl-c.
pub async fn run(cfg: ServiceConfig) -> Result<()> {
    let registry = MlflowClient::new(&cfg.registry)?;
    let artifacts = Arc::new(Artifacts::load(&registry, &cfg.artifacts).await);
    let state = AppState::new(artifacts.clone())?;
    let listener = TcpListener::bind(cfg.bind_addr).await.with_context(|| format!("binding {}", cfg.bind_addr))?;
    info!(addr = %cfg.bind_addr, status = ?artifacts.status(), "model service listening");
    axum::serve(listener, api::router(state)).with_graceful_shutdown(shutdown_signal()).await?;
    info!("shutting down the model service");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
