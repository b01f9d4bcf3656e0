//! Device objects and the per-disk state every dispatch routine works with.
//!
//!  * A disk (`Dcb`) owns the pending list, the buffer mapper, the event
//!    queue and the serial counter.
//!  * A volume (`Vcb`) is what requests are addressed to; it points at its disk.
//!  * The extension is a tagged enum, checked once at the dispatch boundary.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use shared::{EventContext, NtStatus};

use crate::{
    communications::event_queue::EventQueue,
    config::DriverConfig,
    consts::{FIRST_SERIAL_NUMBER, METRIC_COMPLETED},
    error::DispatchError,
    irp::Irp,
    mdl::{BufferMapper, Mdl},
    pending::{DuplicateSerial, IrpEntry, PendingIrpList},
};

/*──────────────────────────── identifier tags ───────────────────────────*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierType {
    /// Global control device.
    Dgl,
    /// Disk control block.
    Dcb,
    /// Volume control block.
    Vcb,
}

#[derive(Debug, Clone)]
pub enum DeviceExtension {
    Global,
    Disk(Arc<Dcb>),
    Volume(Arc<Vcb>),
}

#[derive(Debug, Clone)]
pub struct DeviceObject {
    pub name: String,
    extension: DeviceExtension,
}

impl DeviceObject {
    pub fn new(name: impl Into<String>, extension: DeviceExtension) -> Self {
        Self { name: name.into(), extension }
    }

    pub fn identifier_type(&self) -> IdentifierType {
        match self.extension {
            DeviceExtension::Global => IdentifierType::Dgl,
            DeviceExtension::Disk(_) => IdentifierType::Dcb,
            DeviceExtension::Volume(_) => IdentifierType::Vcb,
        }
    }

    /// The volume behind this device, or a validation error for any other tag.
    pub fn volume(&self) -> Result<&Arc<Vcb>, DispatchError> {
        match &self.extension {
            DeviceExtension::Volume(vcb) => Ok(vcb),
            _ => Err(DispatchError::Validation("device extension is not a volume")),
        }
    }
}

/*──────────────────────────── control blocks ────────────────────────────*/

#[derive(Debug)]
pub struct Vcb {
    pub dcb: Arc<Dcb>,
}

#[derive(Debug)]
pub struct Dcb {
    pub config: DriverConfig,
    pub pending: PendingIrpList,
    pub mapper: BufferMapper,
    pub queue: EventQueue,
    serial: AtomicU64,
}

impl Dcb {
    pub fn new(config: DriverConfig, queue: EventQueue) -> Self {
        Self {
            mapper: BufferMapper::new(config.max_locked_bytes),
            pending: PendingIrpList::new(),
            queue,
            serial: AtomicU64::new(FIRST_SERIAL_NUMBER),
            config,
        }
    }

    pub(crate) fn next_serial_number(&self) -> u64 {
        self.serial.fetch_add(1, Ordering::Relaxed)
    }

    /// Park `irp` in the pending list and hand `event` to the service.
    ///
    /// Returns `Pending` once the service owns the request; any other status
    /// means the request was already finalized here.
    pub(crate) fn register_pending_irp(
        &self,
        irp: Irp,
        mdl: Option<Mdl>,
        event: EventContext,
    ) -> NtStatus {
        let serial = event.serial_number;
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("serial {serial}: {}", DispatchError::from(e));
                return IrpEntry::new(serial, irp, mdl).finish_with(NtStatus::InsufficientResources);
            }
        };
        drop(event);

        irp.set_serial_number(serial);
        if let Err(DuplicateSerial(entry)) = self.pending.insert(IrpEntry::new(serial, irp, mdl)) {
            log::error!("serial {serial} collided with a pending request");
            return entry.finish_with(NtStatus::InsufficientResources);
        }

        if let Err(e) = self.queue.notify(frame) {
            log::warn!("serial {serial}: {}", DispatchError::from(e));
            // A racing cancel may already have finalized it.
            return match self.pending.remove(serial) {
                Some(entry) => entry.finish_with(NtStatus::InsufficientResources),
                None => NtStatus::Pending,
            };
        }

        NtStatus::Pending
    }
}

impl IrpEntry {
    fn finish_with(self, status: NtStatus) -> NtStatus {
        self.finish(status, 0);
        status
    }
}

/*──────────────────────────── IRP helpers ───────────────────────────────*/

/// Finish an IRP and return the given status.
pub fn complete(irp: Irp, status: NtStatus, information: u64) -> NtStatus {
    log::debug!(
        "complete major 0x{:02x}: {status}, information {information}",
        irp.major_function
    );
    metrics::counter!(METRIC_COMPLETED, "status" => status.name()).increment(1);
    irp.complete(status, information);
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communications::event_queue::event_queue;

    #[test]
    fn only_volumes_pass_the_tag_check() {
        let (queue, _rx) = event_queue(1);
        let dcb = Arc::new(Dcb::new(DriverConfig::default(), queue));
        let disk = DeviceObject::new("disk", DeviceExtension::Disk(Arc::clone(&dcb)));
        let volume = DeviceObject::new("vol", DeviceExtension::Volume(Arc::new(Vcb { dcb })));
        let global = DeviceObject::new("global", DeviceExtension::Global);

        assert_eq!(volume.identifier_type(), IdentifierType::Vcb);
        assert!(volume.volume().is_ok());
        assert_eq!(disk.identifier_type(), IdentifierType::Dcb);
        assert!(disk.volume().is_err());
        assert_eq!(global.identifier_type(), IdentifierType::Dgl);
        assert!(global.volume().is_err());
    }

    #[test]
    fn serials_are_unique_and_increasing() {
        let (queue, _rx) = event_queue(1);
        let dcb = Dcb::new(DriverConfig::default(), queue);
        let a = dcb.next_serial_number();
        let b = dcb.next_serial_number();
        assert_eq!(a, FIRST_SERIAL_NUMBER);
        assert!(b > a);
    }
}
