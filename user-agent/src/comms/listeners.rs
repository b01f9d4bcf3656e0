//! Listener abstraction + the event-queue listener.
//! -----------------------------------------------------------------------------
//! A **listener** ingests raw frames from one source, decodes them and pushes
//! `EventContext`s into the router's channel. The event queue is a blocking
//! crossbeam channel, so the read loop lives on a `spawn_blocking` thread and
//! never occupies a Tokio worker.
//!
//! Several listeners may share one queue (`EventReceiver` is cloneable); each
//! frame is delivered to exactly one of them.

use std::sync::Arc;

use async_trait::async_trait;
use log::Level;
use shared::EventContext;
use tokio::{sync::mpsc, task};
use umfs_driver::EventReceiver;

use crate::comms::{METRIC_EVENTS_RECEIVED, METRIC_MALFORMED_EVENTS};
use crate::umfs_log;

#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Display name for metrics / logs.
    fn name(&self) -> &'static str;

    /// Run the I/O loop until the source closes or `tx` is dropped.
    async fn ingest(self: Arc<Self>, tx: mpsc::Sender<EventContext>);

    /// Launch `ingest` on the runtime.
    fn spawn(self: Arc<Self>, tx: mpsc::Sender<EventContext>) -> task::JoinHandle<()> {
        let name = self.name();
        task::spawn(async move {
            umfs_log!(Level::Info, "listener", "listener '{}' started", name);
            self.ingest(tx).await;
            umfs_log!(Level::Info, "listener", "listener '{}' exited", name);
        })
    }
}

/// Reads encoded `EventContext` frames from the driver's event queue.
pub struct EventQueueListener {
    rx: EventReceiver,
}

impl EventQueueListener {
    pub fn new(rx: EventReceiver) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl Listener for EventQueueListener {
    fn name(&self) -> &'static str {
        "event_queue"
    }

    async fn ingest(self: Arc<Self>, tx: mpsc::Sender<EventContext>) {
        let rx = self.rx.clone();
        let reader = task::spawn_blocking(move || {
            // `None` once the driver closed the queue and it is drained.
            while let Some(frame) = rx.recv() {
                let ev = match EventContext::decode(&frame) {
                    Ok(ev) => ev,
                    Err(e) => {
                        log::error!("event decode error ({} bytes): {e}", frame.len());
                        metrics::counter!(METRIC_MALFORMED_EVENTS).increment(1);
                        continue;
                    }
                };
                metrics::counter!(METRIC_EVENTS_RECEIVED).increment(1);
                // blocking_send() blocks this thread only, never a Tokio worker
                if tx.blocking_send(ev).is_err() {
                    log::warn!("router gone, event queue reader stopping");
                    break;
                }
            }
        });
        if let Err(e) = reader.await {
            log::error!("event queue reader failed: {e}");
        }
    }
}
