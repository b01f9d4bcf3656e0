// src/config/model.rs

use std::{net::SocketAddr, str::FromStr, time::Duration};

use serde::{Deserialize, Deserializer};
use shared::security::{Sid, SidError};
use thiserror::Error;
use umfs_driver::DriverConfig;

/// Top-level runtime config, one field per TOML table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Mirror of the `[logging]` table
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]                   pub enable: bool,
    #[serde(default)]                   pub file:   Option<String>,
    #[serde(default = "default_level")] pub level:  String,
}
fn default_level() -> String { "INFO".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enable: false, file: None, level: default_level() }
    }
}

/// Mirror of the `[service]` table
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Owner reported by the built-in security handler, e.g. `"S-1-5-32-544"`.
    #[serde(default = "default_owner")]
    pub owner_sid: String,
    #[serde(default = "default_group")]
    pub group_sid: String,
    /// How often expired pending requests are released.
    #[serde(default = "default_sweep", deserialize_with = "duration_from_str")]
    pub sweep_interval: Duration,
    /// Event-queue readers draining the driver.
    #[serde(default = "default_workers")]
    pub workers: usize,
}
fn default_owner() -> String { "S-1-5-32-544".into() }
fn default_group() -> String { "S-1-5-18".into() }
fn default_sweep() -> Duration { Duration::from_secs(5) }
fn default_workers() -> usize { 1 }

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            owner_sid: default_owner(),
            group_sid: default_group(),
            sweep_interval: default_sweep(),
            workers: default_workers(),
        }
    }
}

impl ServiceConfig {
    pub fn owner(&self) -> Result<Sid, ConfigError> {
        parse_sid(&self.owner_sid)
    }

    pub fn group(&self) -> Result<Sid, ConfigError> {
        parse_sid(&self.group_sid)
    }
}

/// Mirror of the optional `[metrics]` table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus scrape address; exporter disabled when absent.
    #[serde(default)]
    pub listen: Option<SocketAddr>,
}

/// All the ways config loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid SID '{0}': {1}")]
    InvalidSid(String, #[source] SidError),

    #[error("invalid value for '{0}': {1}")]
    InvalidValue(&'static str, String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

fn parse_sid(raw: &str) -> Result<Sid, ConfigError> {
    Sid::from_str(raw).map_err(|e| ConfigError::InvalidSid(raw.into(), e))
}

fn duration_from_str<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(de)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}
