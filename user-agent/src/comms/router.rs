//! Event router
//! ============
//! Takes decoded `EventContext`s from the listeners, calls the matching
//! `FileSystem` callback and completes the request in the driver.
//!
//! Each event is answered on its own task so one slow callback cannot hold
//! up the others. Responses are encoded and handed to
//! `Driver::complete_event` exactly as a frame from another process would be.
//!
//! Size negotiation happens here: a descriptor larger than the caller's
//! buffer is answered with `BufferOverflow` and the required length, and no
//! bytes. Major functions without a callback are answered `NotImplemented`.

use std::sync::Arc;

use log::Level;
use shared::{constants::IRP_MJ_QUERY_SECURITY, EventContext, NtStatus, ResponseMessage};
use tokio::{sync::mpsc, task::{self, JoinSet}};
use umfs_driver::{helpers::major_function_name, Driver};

use crate::{
    comms::METRIC_RESPONSES,
    fs::{FileSystem, SecurityRequest},
    umfs_log,
};

pub struct Router<F: FileSystem> {
    driver: Arc<Driver>,
    fs: Arc<F>,
}

impl<F: FileSystem> Router<F> {
    pub fn new(driver: Arc<Driver>, fs: Arc<F>) -> Self {
        Self { driver, fs }
    }

    /// Run until every listener has dropped its sender, then wait for the
    /// callbacks still in flight. Returns the number of events handled.
    pub fn spawn(self: Arc<Self>, mut rx: mpsc::Receiver<EventContext>) -> task::JoinHandle<usize> {
        task::spawn(async move {
            umfs_log!(Level::Info, "router", "router started");
            let mut in_flight = JoinSet::new();
            let mut handled = 0usize;
            while let Some(ev) = rx.recv().await {
                let router = Arc::clone(&self);
                in_flight.spawn(async move { router.handle(ev).await });
                handled += 1;
                while in_flight.try_join_next().is_some() {}
            }
            while in_flight.join_next().await.is_some() {}
            umfs_log!(Level::Info, "router", "router stopped after {} event(s)", handled);
            handled
        })
    }

    /// Answer one event and complete it in the driver.
    ///
    /// `false` when the driver no longer knew the request (cancelled or
    /// timed out while the callback ran).
    pub async fn handle(&self, ev: EventContext) -> bool {
        let response = self.route(&ev).await;
        metrics::counter!(METRIC_RESPONSES, "status" => response.status.name()).increment(1);
        log::debug!(
            "serial {} {} -> {} ({} bytes)",
            ev.serial_number,
            major_function_name(ev.major_function),
            response.status,
            response.result_length
        );
        match self.driver.complete_event(&response.encode()) {
            Ok(matched) => matched,
            Err(e) => {
                log::error!("serial {}: driver rejected response: {e}", ev.serial_number);
                false
            }
        }
    }

    /// Build the response for `ev` without touching the driver.
    pub async fn route(&self, ev: &EventContext) -> ResponseMessage {
        match ev.major_function {
            IRP_MJ_QUERY_SECURITY => {
                let request = SecurityRequest::from(ev);
                let result = self.fs.get_file_security(&request).await;
                security_response(ev.serial_number, ev.buffer_length, result)
            }
            other => {
                log::warn!("no callback for {} (0x{other:02x})", major_function_name(other));
                ResponseMessage::error(ev.serial_number, NtStatus::NotImplemented)
            }
        }
    }
}

/// Negotiate a variable-length descriptor against `buffer_length`.
pub fn security_response(
    serial_number: u64,
    buffer_length: u32,
    result: Result<Vec<u8>, NtStatus>,
) -> ResponseMessage {
    match result {
        Ok(descriptor) => match u32::try_from(descriptor.len()) {
            Ok(needed) if needed > buffer_length => ResponseMessage::overflow(serial_number, needed),
            Ok(_) => ResponseMessage::success(serial_number, descriptor)
                .unwrap_or_else(|_| ResponseMessage::error(serial_number, NtStatus::InsufficientResources)),
            Err(_) => ResponseMessage::error(serial_number, NtStatus::InsufficientResources),
        },
        // A callback reporting success through the error path is a bug in the callback.
        Err(status) if status.is_success() => ResponseMessage::error(serial_number, NtStatus::InvalidParameter),
        Err(status) => ResponseMessage::error(serial_number, status),
    }
}
