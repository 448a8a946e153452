//! Configuration management for chainwatch

use crate::criteria::ResolvePhase;
use crate::error::{ChainError, Result};
use serde::{Deserialize, Deserializer};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub submit: SubmitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Defaults applied to every submission that does not override them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitConfig {
    /// Process-wide resolve point. Unset means `finalized`.
    #[serde(default)]
    pub resolve_on: Option<ResolvePhase>,
    /// Zero disables the timeout.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}

pub fn load_config() -> Result<Config> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// Load `path`, falling back to defaults when the file does not exist.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config_str = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => return Err(e.into()),
    };
    let config: Config = toml::from_str(&config_str)?;

    if config.logging.level.trim().is_empty() {
        return Err(ChainError::ConfigError(format!(
            "logging.level must not be empty in {}",
            path.display()
        )));
    }

    Ok(config)
}
