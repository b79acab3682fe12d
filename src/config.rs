//! Configuration loader and validator for the restaurant directory client.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::geocode::controller::GeocodeSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub backend: Backend,
    pub geocoding: Geocoding,
}

/// View-state tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub page_size: usize,
    pub address_debounce_ms: u64,
    pub geocode_min_length: usize,
    pub map_filter_debounce_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Sqlite,
    Rest,
}

/// Which backend to talk to and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Backend {
    pub kind: BackendKind,
    #[serde(default)]
    pub database_url: String,
    #[serde(default)]
    pub rest_url: String,
    #[serde(default)]
    pub anon_key: String,
    #[serde(default)]
    pub credentials_path: Option<String>,
}

/// Geocoding service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Geocoding {
    pub base_url: String,
    pub user_agent: String,
}

impl App {
    pub fn address_debounce(&self) -> Duration {
        Duration::from_millis(self.address_debounce_ms)
    }

    pub fn map_filter_debounce(&self) -> Duration {
        Duration::from_millis(self.map_filter_debounce_ms)
    }

    pub fn geocode_settings(&self) -> GeocodeSettings {
        GeocodeSettings {
            quiet: self.address_debounce(),
            min_length: self.geocode_min_length,
        }
    }
}

impl Backend {
    /// `DATABASE_URL` wins over the configured SQLite URL.
    pub fn resolved_database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.database_url.clone())
    }

    pub fn credentials_path(&self) -> Option<PathBuf> {
        self.credentials_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.page_size == 0 {
        return Err(ConfigError::Invalid("app.page_size must be > 0"));
    }
    if cfg.app.address_debounce_ms == 0 {
        return Err(ConfigError::Invalid("app.address_debounce_ms must be > 0"));
    }
    if cfg.app.geocode_min_length == 0 {
        return Err(ConfigError::Invalid("app.geocode_min_length must be > 0"));
    }
    if cfg.app.map_filter_debounce_ms == 0 {
        return Err(ConfigError::Invalid("app.map_filter_debounce_ms must be > 0"));
    }

    match cfg.backend.kind {
        BackendKind::Sqlite => {
            if cfg.backend.database_url.trim().is_empty() {
                return Err(ConfigError::Invalid("backend.database_url must be non-empty"));
            }
        }
        BackendKind::Rest => {
            if Url::parse(cfg.backend.rest_url.trim()).is_err() {
                return Err(ConfigError::Invalid("backend.rest_url must be a valid URL"));
            }
            if cfg.backend.anon_key.trim().is_empty() {
                return Err(ConfigError::Invalid("backend.anon_key must be non-empty"));
            }
        }
    }

    if Url::parse(cfg.geocoding.base_url.trim()).is_err() {
        return Err(ConfigError::Invalid("geocoding.base_url must be a valid URL"));
    }
    if cfg.geocoding.user_agent.trim().is_empty() {
        return Err(ConfigError::Invalid("geocoding.user_agent must be non-empty"));
    }

    Ok(())
}

/// Example configuration for a local SQLite setup.
pub fn example() -> &'static str {
    r#"app:
  page_size: 6
  address_debounce_ms: 500
  geocode_min_length: 5
  map_filter_debounce_ms: 300

backend:
  kind: sqlite
  database_url: "sqlite://./data/restodir.db"
  rest_url: "https://YOUR_PROJECT.supabase.co/"
  anon_key: "YOUR_ANON_KEY"
  credentials_path: "./data/session.json"

geocoding:
  base_url: "https://nominatim.openstreetmap.org/"
  user_agent: "restodir/0.1 (contact@example.com)"
"#
}
