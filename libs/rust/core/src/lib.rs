//! Core shared utilities for HomeLens services.

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod config;
pub mod features;
pub mod model_registry;

pub use config::{ConfigError, RegistryConfig};
pub use features::{zip_features, ExampleRow, FeatureKind, FeatureRecord, FeatureSpec, OceanProximity, SchemaError, EXAMPLE_ROWS, FEATURES, FEATURE_NAMES};
pub use model_registry::{Experiment, MlflowClient, ModelUri, ModelVersion, RegistryApi, RegistryError, Run, RunSearch};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Installs the global subscriber once per process. `HOMELENS_JSON_LOG=1` switches to
/// flattened JSON lines; the filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_tracing(service: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var("HOMELENS_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(env_filter);
        if json {
            registry
                .with(tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false))
                .try_init()?;
        } else {
            registry
                .with(tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(true))
                .try_init()?;
        }
        Ok(())
    })?;
    info!(target: "homelens", service, "tracing initialized");
    Ok(())
}
