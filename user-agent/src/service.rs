//! Service assembly: listeners → router → driver, plus the timeout sweeper.
//!
//! ```text
//!   Driver ──EventReceiver──▶ EventQueueListener ×N ──mpsc──▶ Router ──▶ FileSystem
//!      ▲                                                        │
//!      └──────────────────── complete_event(frame) ─────────────┘
//! ```
//!
//! Stopping shuts the driver down first: pending requests are cancelled and
//! the event queue closes, which ends the listeners, which ends the router.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::Level;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use umfs_driver::{Driver, EventReceiver};

use crate::{
    comms::{EventQueueListener, Listener, Router},
    config::model::ServiceConfig,
    fs::FileSystem,
    umfs_log,
};

/// Capacity of the listener → router channel.
const ROUTER_QUEUE: usize = 1024;

/// A running service. Dropping it without [`stop`](Self::stop) leaves the
/// tasks running until the runtime shuts down.
pub struct Service {
    driver: Arc<Driver>,
    listeners: Vec<JoinHandle<()>>,
    router: JoinHandle<usize>,
    sweeper: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

impl Service {
    /// Spawn everything on the current Tokio runtime.
    pub fn start<F: FileSystem>(
        driver: Arc<Driver>,
        events: EventReceiver,
        fs: Arc<F>,
        cfg: &ServiceConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(ROUTER_QUEUE);
        let listeners = (0..cfg.workers.max(1))
            .map(|_| Arc::new(EventQueueListener::new(events.clone())).spawn(tx.clone()))
            .collect();
        drop(tx);

        let router = Arc::new(Router::new(Arc::clone(&driver), fs)).spawn(rx);

        let (stop_tx, stop_rx) = watch::channel(false);
        let sweeper = tokio::spawn(sweep(Arc::clone(&driver), cfg.sweep_interval, stop_rx));

        umfs_log!(
            Level::Info,
            "service",
            "service started: {} listener(s), sweep every {}",
            cfg.workers.max(1),
            humantime::format_duration(cfg.sweep_interval)
        );
        Self { driver, listeners, router, sweeper, stop_tx }
    }

    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    /// Shut the driver down and wait for every task.
    ///
    /// Returns the number of requests that were still pending and got cancelled.
    pub async fn stop(self) -> usize {
        let Service { driver, listeners, router, sweeper, stop_tx } = self;

        let cancelled = driver.shutdown();
        let _ = stop_tx.send(true);

        for listener in listeners {
            if let Err(e) = listener.await {
                log::error!("listener task failed: {e}");
            }
        }
        match router.await {
            Ok(handled) => log::info!("router handled {handled} event(s)"),
            Err(e) => log::error!("router task failed: {e}"),
        }
        if let Err(e) = sweeper.await {
            log::error!("sweeper task failed: {e}");
        }

        umfs_log!(Level::Info, "service", "service stopped, {} request(s) cancelled", cancelled);
        cancelled
    }
}

/// Release expired pending requests every `every` until told to stop.
pub async fn sweep(driver: Arc<Driver>, every: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let released = driver.release_timeout_pending(Instant::now());
                if released > 0 {
                    umfs_log!(Level::Warn, "sweeper", "released {} timed-out request(s)", released);
                }
            }
            // Err means the sender is gone, which is a stop too.
            _ = stop.changed() => break,
        }
    }
}
