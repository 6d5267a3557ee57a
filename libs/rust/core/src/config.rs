//! Layered configuration shared by every HomeLens binary.
//!
//! Sources, lowest precedence first: per-service defaults, an optional YAML file named by
//! `HOMELENS_CONFIG_FILE`, then environment variables. Registry credentials use the
//! `MLFLOW_*` names the tracking server tooling already expects.

use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File, FileFormat, Map};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

pub const CONFIG_FILE_ENV: &str = "HOMELENS_CONFIG_FILE";
pub const DEFAULT_TRACKING_URI: &str = "https://dagshub.com/matteogianferrari/homelens-ca.mlflow";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error(transparent)]
    Source(#[from] config::ConfigError),
}

/// Starts a builder with the service name default and the optional YAML file layered in.
pub fn builder(service: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let mut builder = Config::builder().set_default("service_name", service)?;
    if let Ok(file) = std::env::var(CONFIG_FILE_ENV) {
        builder = builder.add_source(File::new(&file, FileFormat::Yaml).required(false));
    }
    Ok(builder)
}

/// `HOMELENS_*` variables; `vars` replaces the process environment when given.
pub fn service_env(vars: Option<Map<String, String>>) -> Environment {
    Environment::with_prefix("HOMELENS").prefix_separator("_").separator("__").try_parsing(true).source(vars)
}

pub fn require_http_url(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Invalid { key, reason: format!("expected an http(s) URL, got {value:?}") })
    }
}

#[derive(Debug, Deserialize)]
struct RawRegistry {
    tracking_uri: String,
    tracking_username: Option<String>,
    tracking_password: Option<String>,
}

/// Connection settings for the MLflow tracking server.
#[derive(Clone)]
pub struct RegistryConfig {
    pub tracking_uri: String,
    pub username: String,
    password: String,
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("tracking_uri", &self.tracking_uri)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl RegistryConfig {
    pub fn new(tracking_uri: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { tracking_uri: tracking_uri.into(), username: username.into(), password: password.into() }
    }

    pub fn from_env() -> Result<Self, ConfigError> { Self::from_vars(None) }

    /// Reads `MLFLOW_TRACKING_URI`, `MLFLOW_TRACKING_USERNAME` and `MLFLOW_TRACKING_PASSWORD`.
    /// Username and password must be present and non-empty.
    pub fn from_vars(vars: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        let cfg = builder("registry")?
            .set_default("tracking_uri", DEFAULT_TRACKING_URI)?
            .add_source(Environment::with_prefix("MLFLOW").source(vars))
            .build()?;
        let raw: RawRegistry = cfg.try_deserialize()?;
        require_http_url("MLFLOW_TRACKING_URI", &raw.tracking_uri)?;
        let username = raw.tracking_username.filter(|v| !v.trim().is_empty()).ok_or(ConfigError::Missing("MLFLOW_TRACKING_USERNAME"))?;
        let password = raw.tracking_password.filter(|v| !v.is_empty()).ok_or(ConfigError::Missing("MLFLOW_TRACKING_PASSWORD"))?;
        Ok(Self::new(raw.tracking_uri, username, password))
    }

    pub fn password(&self) -> &str { &self.password }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Option<Map<String, String>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn registry_reads_credentials_and_defaults_uri() {
        let cfg = RegistryConfig::from_vars(vars(&[
            ("MLFLOW_TRACKING_USERNAME", "alice"),
            ("MLFLOW_TRACKING_PASSWORD", "s3cret"),
        ])).unwrap();
        assert_eq!(cfg.tracking_uri, DEFAULT_TRACKING_URI);
        assert_eq!(cfg.username, "alice");
        assert_eq!(cfg.password(), "s3cret");
        assert!(!format!("{cfg:?}").contains("s3cret"));
    }

    #[test]
    fn registry_rejects_missing_password() {
        let err = RegistryConfig::from_vars(vars(&[("MLFLOW_TRACKING_USERNAME", "alice")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("MLFLOW_TRACKING_PASSWORD")));
    }

    #[test]
    fn registry_rejects_blank_username() {
        let err = RegistryConfig::from_vars(vars(&[
            ("MLFLOW_TRACKING_USERNAME", "  "),
            ("MLFLOW_TRACKING_PASSWORD", "pw"),
        ])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("MLFLOW_TRACKING_USERNAME")));
    }

    #[test]
    fn registry_rejects_non_http_uri() {
        let err = RegistryConfig::from_vars(vars(&[
            ("MLFLOW_TRACKING_URI", "file:///tmp/mlruns"),
            ("MLFLOW_TRACKING_USERNAME", "u"),
            ("MLFLOW_TRACKING_PASSWORD", "p"),
        ])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MLFLOW_TRACKING_URI", .. }));
    }
}
