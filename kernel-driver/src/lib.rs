//! umfs driver core: the bridge between a synchronous-completion I/O stack
//! and an out-of-process file system service.
//!
//! A request enters through [`Driver::dispatch`]. It is either finalized on
//! the spot (validation failure, resource failure, immediate answer) or
//! parked in the pending list while an `EventContext` frame goes out on the
//! event queue, and `Pending` is returned. The service's answer comes back
//! through [`Driver::complete_event`], is matched by serial number, and the
//! request is finalized exactly once. Cancellation, timeouts and shutdown
//! take entries out of the same list, so a late answer finds nothing and is
//! dropped.
//!
//! The core owns no threads: every entry point runs on the caller's context.

use std::{sync::Arc, time::Instant};

use shared::{
    constants::{IRP_MJ_QUERY_SECURITY, IRP_MJ_SET_SECURITY},
    NtStatus, ResponseMessage, WireError,
};

pub mod communications;
pub mod completion;
pub mod config;
pub mod consts;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod event_context;
pub mod helpers;
pub mod irp;
pub mod mdl;
pub mod pending;
pub mod security;

pub use communications::event_queue::{EventReceiver, QueueError};
pub use config::DriverConfig;
pub use device::{DeviceExtension, DeviceObject, IdentifierType};
pub use error::DispatchError;
pub use irp::{Ccb, FileObject, IoStatusBlock, Irp, IrpWatcher, Parameters, UserBuffer};

use communications::event_queue::event_queue;
use consts::{DISK_DEVICE_NAME, VOLUME_DEVICE_NAME};
use device::{Dcb, Vcb};
use dispatch::Dispatcher;

/// One mounted disk/volume pair with its dispatch tables.
pub struct Driver {
    disk: DeviceObject,
    volume: DeviceObject,
    dcb: Arc<Dcb>,
    dispatcher: Dispatcher,
}

impl Driver {
    /// Create the devices and install the dispatch tables.
    ///
    /// The returned receiver is the service's end of the event queue.
    pub fn new(config: DriverConfig) -> (Self, EventReceiver) {
        let (queue, receiver) = event_queue(config.event_queue_capacity);
        let dcb = Arc::new(Dcb::new(config, queue));
        let vcb = Arc::new(Vcb { dcb: Arc::clone(&dcb) });

        let mut dispatcher = Dispatcher::new();
        dispatcher.register(IRP_MJ_QUERY_SECURITY, security::dispatch_query_security);
        dispatcher.register(IRP_MJ_SET_SECURITY, security::dispatch_set_security);
        dispatcher.register_completion(IRP_MJ_QUERY_SECURITY, security::complete_query_security);

        log::info!(
            "driver loaded: immediate_security={}, queue capacity {}",
            dcb.config.immediate_security,
            dcb.config.event_queue_capacity
        );

        let driver = Self {
            disk: DeviceObject::new(DISK_DEVICE_NAME, DeviceExtension::Disk(Arc::clone(&dcb))),
            volume: DeviceObject::new(VOLUME_DEVICE_NAME, DeviceExtension::Volume(vcb)),
            dcb,
            dispatcher,
        };
        (driver, receiver)
    }

    /// Device requests for files on the mounted volume are addressed to.
    pub fn volume_device(&self) -> &DeviceObject {
        &self.volume
    }

    pub fn disk_device(&self) -> &DeviceObject {
        &self.disk
    }

    pub fn config(&self) -> &DriverConfig {
        &self.dcb.config
    }

    /// Entry point for a new request. Returns `Pending` when the service owns it.
    pub fn dispatch(&self, device: &DeviceObject, irp: Irp) -> NtStatus {
        self.dispatcher.dispatch(device, irp)
    }

    /// Decode and apply one response frame from the service.
    ///
    /// `Ok(false)` means the serial matched nothing (stale or cancelled).
    pub fn complete_event(&self, frame: &[u8]) -> Result<bool, WireError> {
        let response = ResponseMessage::decode(frame).inspect_err(|e| {
            log::warn!("malformed response frame: {e}");
        })?;
        Ok(self.complete(response))
    }

    pub fn complete(&self, response: ResponseMessage) -> bool {
        completion::complete_event(&self.dcb, &self.dispatcher, response)
    }

    /// The caller gave up on the request with this serial number.
    pub fn cancel(&self, serial_number: u64) -> bool {
        match self.dcb.pending.cancel(serial_number) {
            Some(entry) => {
                entry.finish(NtStatus::Cancelled, 0);
                true
            }
            None => false,
        }
    }

    /// Finalize requests the service has sat on longer than `pending_timeout`.
    pub fn release_timeout_pending(&self, now: Instant) -> usize {
        let expired = self.dcb.pending.take_expired(now, self.dcb.config.pending_timeout);
        let count = expired.len();
        for entry in expired {
            log::warn!("serial {} timed out", entry.serial_number);
            entry.finish(NtStatus::InsufficientResources, 0);
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.dcb.pending.len()
    }

    /// Locked bytes and live mappings, for leak checks.
    pub fn locked_buffers(&self) -> (usize, usize) {
        (self.dcb.mapper.locked_bytes(), self.dcb.mapper.outstanding())
    }

    /// Close the event queue and cancel everything still pending.
    pub fn shutdown(&self) -> usize {
        self.dcb.queue.close();
        let drained = self.dcb.pending.drain();
        let count = drained.len();
        for entry in drained {
            entry.finish(NtStatus::Cancelled, 0);
        }
        log::info!("driver unloaded, {count} pending request(s) cancelled");
        count
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if !self.dcb.pending.is_empty() {
            self.shutdown();
        }
    }
}
