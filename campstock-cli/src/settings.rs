//! Layered configuration
//!
//! Built-in defaults, then the YAML file (`campstock.yaml` unless `--config`
//! names another), then `CAMPSTOCK__SECTION__KEY` environment variables, then
//! command-line overrides.

use anyhow::{Context, Result};
use campstock_sync::{ConnectivityConfig, EngineConfig, StoreConfig, SyncConfig};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "campstock.yaml";
const ENV_PREFIX: &str = "CAMPSTOCK";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for campstock targets unless `RUST_LOG` is set
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub connectivity: ConnectivityConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from the process environment. An explicitly named file must
    /// exist; the default file is optional.
    pub fn load(path: Option<&Path>, db_override: Option<&str>) -> Result<Self> {
        let env = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true);

        Self::build(path, env, db_override)
    }

    fn build(path: Option<&Path>, env: Environment, db_override: Option<&str>) -> Result<Self> {
        let (file, required) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_FILE), false),
        };

        let settings = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::from(file).required(required))
            .add_source(env)
            .set_override_option("store.db_path", db_override)?
            .build()
            .with_context(|| format!("Failed to load configuration from {}", file.display()))?;

        let config: Self = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.engine().validate().context("Invalid configuration")?;

        Ok(config)
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            store: self.store.clone(),
            sync: self.sync.clone(),
            connectivity: self.connectivity.clone(),
        }
    }
}
