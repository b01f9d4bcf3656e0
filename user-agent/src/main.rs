// src/main.rs

//! Agent entry-point.
//!
//! 1. Parse configuration & set up structured logging
//! 2. Optionally expose Prometheus metrics
//! 3. Load the driver core and start the service around it
//! 4. Wait for Ctrl-C, then shut down cleanly

use std::{
    path::{Path, PathBuf},
    process,
    sync::Arc,
    thread,
};

use anyhow::Context;
use chrono::Local;
use fern::Dispatch;
use log::LevelFilter;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::runtime::Runtime;

use agent::{
    config::{self, model::LoggingConfig, Config},
    Service, StaticSecurity,
};
use umfs_driver::Driver;

/// Config file used when none is given on the command line.
const DEFAULT_CONFIG: &str = "config.toml";

/// Configure global logging as requested in `[logging]`.
///
/// A relative log file is placed next to the config file.
fn setup_logging(base_dir: &Path, logging: &LoggingConfig) -> Result<(), fern::InitError> {
    let level = match logging.level.to_uppercase().as_str() {
        "ERROR" => LevelFilter::Error,
        "WARN" => LevelFilter::Warn,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    let log_path = logging
        .enable
        .then(|| base_dir.join(logging.file.as_deref().unwrap_or("umfs-agent.log")));

    let mut dispatch = Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}][pid={}][tid={:?}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                process::id(),
                thread::current().id(),
                msg
            ))
        })
        .level(level)
        .chain(std::io::stdout());

    if let Some(path) = log_path {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    if let Some(addr) = cfg.metrics.listen {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        log::info!("metrics exported on http://{addr}/metrics");
    }

    let fs = Arc::new(StaticSecurity::from_config(&cfg.service)?);
    let (driver, events) = Driver::new(cfg.driver.clone());
    let service = Service::start(Arc::new(driver), events, fs, &cfg.service);
    log::info!("service running, Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    log::warn!("shutdown initiated");

    let cancelled = service.stop().await;
    log::info!("service stopped cleanly ({cancelled} request(s) cancelled)");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cfg_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let base_dir = cfg_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let cfg = config::load(&cfg_path)
        .with_context(|| format!("loading {}", cfg_path.display()))?;
    setup_logging(&base_dir, &cfg.logging).context("logging setup failed")?;
    log::info!("agent bootstrap initiated");

    let rt = Runtime::new().context("Tokio runtime creation failed")?;
    rt.block_on(run(cfg))
}
