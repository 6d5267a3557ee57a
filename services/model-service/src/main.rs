use anyhow::{Context, Result};
use homelens_core::init_tracing;
use model_service::config::{ServiceConfig, SERVICE};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(SERVICE)?;
    let cfg = ServiceConfig::load().context("loading model-service configuration")?;
    info!(?cfg, "config loaded");
    model_service::run(cfg).await
}
