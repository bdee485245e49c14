//! Service configuration.
//!
//! One [`CatalogConfig`] is read from an optional TOML file overlaid by
//! `CATALOG__SECTION__KEY` environment variables. The `[database]` section is
//! [`DatabaseConfig`] from the pool module.

pub use crate::pool::config::{DatabaseConfig, DEFAULT_CONFIG_FILE, ENV_PREFIX};

use crate::pool::config::load_sources;
use ::config::ConfigError;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// `may` worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            workers: default_workers(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CatalogConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl CatalogConfig {
    /// Loads from `path` (missing file is fine) and the environment
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let cfg: CatalogConfig = load_sources(path)?.try_deserialize()?;
        cfg.validate()?;
        log::debug!(
            "configuration loaded: bind={} workers={} backend={:?}",
            cfg.server.bind,
            cfg.server.workers,
            cfg.store.backend
        );
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        if self.server.workers == 0 {
            return Err(ConfigError::Message(
                "server.workers must be at least 1".to_string(),
            ));
        }
        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::Message("server.bind must not be empty".to_string()));
        }
        Ok(())
    }
}
