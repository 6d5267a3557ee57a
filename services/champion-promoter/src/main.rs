use anyhow::{Context, Result};
use champion_promoter::{promote_champion, PromotionPlan};
use clap::Parser;
use homelens_core::{init_tracing, MlflowClient, RegistryConfig};
use tracing::info;

/// Move the champion alias to the best-scoring run of an experiment.
#[derive(Parser, Debug)]
#[command(name = "champion-promoter")]
struct Args {
    /// Registered model whose alias is managed
    #[arg(long, default_value = "homelens-ca-model")]
    model_name: String,

    /// Experiment searched for candidate runs
    #[arg(long, default_value = "HomeLens CA-DL Research")]
    experiment: String,

    /// Run metric ranked in descending order; only positive values qualify
    #[arg(long, default_value = "test_r2_score")]
    metric: String,

    #[arg(long, default_value = "champion")]
    alias: String,

    /// Path of the model inside the run's artifacts
    #[arg(long, default_value = "model")]
    artifact_path: String,

    /// Report the decision without touching the registry
    #[arg(long)]
    dry_run: bool,
}

impl From<Args> for PromotionPlan {
    fn from(a: Args) -> Self {
        Self { model_name: a.model_name, experiment: a.experiment, metric: a.metric, alias: a.alias, artifact_path: a.artifact_path, dry_run: a.dry_run }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("champion-promoter")?;
    let args = Args::parse();
    let cfg = RegistryConfig::from_env().context("loading registry configuration")?;
    info!(tracking_uri = %cfg.tracking_uri, "connecting to registry");
    let registry = MlflowClient::new(&cfg)?;
    let outcome = promote_champion(&registry, &args.into()).await?;
    info!(?outcome, "promotion finished");
    Ok(())
}
