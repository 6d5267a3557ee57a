use config::Map;
use homelens_core::config::{builder, require_http_url, service_env, ConfigError};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

pub const SERVICE: &str = "ui-service";
pub const DEFAULT_MODEL_SERVING_URL: &str = "http://127.0.0.1:7860/predict";

#[derive(Debug, Deserialize)]
struct Raw {
    bind_addr: String,
    model_serving_url: String,
    request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub bind_addr: SocketAddr,
    pub model_serving_url: String,
    pub request_timeout: Duration,
}

impl UiConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_vars(None, std::env::var("MODEL_SERVING_URL").ok())
    }

    /// `serving_url` is the unprefixed `MODEL_SERVING_URL`, which wins over every other source.
    pub fn from_vars(vars: Option<Map<String, String>>, serving_url: Option<String>) -> Result<Self, ConfigError> {
        let cfg = builder(SERVICE)?
            .set_default("bind_addr", "0.0.0.0:8080")?
            .set_default("model_serving_url", DEFAULT_MODEL_SERVING_URL)?
            .set_default("request_timeout_secs", 3)?
            .add_source(service_env(vars))
            .set_override_option("model_serving_url", serving_url)?
            .build()?;
        let raw: Raw = cfg.try_deserialize()?;
        let bind_addr = raw.bind_addr.parse().map_err(|e| ConfigError::Invalid { key: "HOMELENS_BIND_ADDR", reason: format!("{e}") })?;
        require_http_url("MODEL_SERVING_URL", &raw.model_serving_url)?;
        if raw.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid { key: "HOMELENS_REQUEST_TIMEOUT_SECS", reason: "must be positive".into() });
        }
        Ok(Self { bind_addr, model_serving_url: raw.model_serving_url, request_timeout: Duration::from_secs(raw.request_timeout_secs) })
    }
}
