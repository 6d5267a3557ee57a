use anyhow::{Context, Result};
use homelens_core::init_tracing;
use tracing::info;
use ui_service::config::{UiConfig, SERVICE};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(SERVICE)?;
    let cfg = UiConfig::load().context("loading ui-service configuration")?;
    info!(?cfg, "config loaded");
    ui_service::run(cfg).await
}
