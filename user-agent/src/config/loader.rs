// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads `config.toml`, deserializes it into [`Config`] and checks the
//! values serde cannot check on its own.

use std::{fs, path::Path};

use log::Level;

use crate::config::model::{Config, ConfigError};
use crate::umfs_log;

/// Load, parse and validate the configuration at `path`.
/// Logs at DEBUG before reading and INFO on success.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    umfs_log!(Level::Debug, "config", "Reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg = parse(&txt)?;
    umfs_log!(Level::Info, "config", "Loaded config from {:?}", path);
    Ok(cfg)
}

/// Parse and validate a configuration held in memory.
pub fn parse(txt: &str) -> Result<Config, ConfigError> {
    let cfg: Config = toml::from_str(txt)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    cfg.service.owner()?;
    cfg.service.group()?;

    if cfg.driver.event_queue_capacity == 0 {
        return Err(ConfigError::InvalidValue("driver.event_queue_capacity", "must be at least 1".into()));
    }
    if cfg.service.workers == 0 {
        return Err(ConfigError::InvalidValue("service.workers", "must be at least 1".into()));
    }
    if cfg.service.sweep_interval.is_zero() {
        return Err(ConfigError::InvalidValue("service.sweep_interval", "must be non-zero".into()));
    }
    Ok(())
}
