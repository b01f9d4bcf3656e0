//! Table of requests handed to the service and not yet finalized.
//!
//! Every operation is one short critical section around the map. Buffer
//! copies, completions and queue hand-offs happen after the lock is dropped,
//! on the entry the table handed back.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use shared::NtStatus;
use thiserror::Error;

use crate::{consts::METRIC_PENDING_IRPS, device::complete, irp::Irp, mdl::Mdl};

/// One in-flight request: the IRP plus the mapping of its buffer.
#[derive(Debug)]
pub struct IrpEntry {
    pub serial_number: u64,
    pub irp: Irp,
    pub mdl: Option<Mdl>,
    pub registered_at: Instant,
}

impl IrpEntry {
    pub fn new(serial_number: u64, irp: Irp, mdl: Option<Mdl>) -> Self {
        Self { serial_number, irp, mdl, registered_at: Instant::now() }
    }

    /// Release the mapping, then complete the IRP.
    pub fn finish(self, status: NtStatus, information: u64) {
        let IrpEntry { irp, mdl, .. } = self;
        if let Some(mdl) = mdl {
            mdl.release();
        }
        complete(irp, status, information);
    }
}

/// Returned by [`PendingIrpList::insert`]; hands the rejected entry back.
#[derive(Debug, Error)]
#[error("serial {} is already pending", .0.serial_number)]
pub struct DuplicateSerial(pub IrpEntry);

#[derive(Debug, Default)]
pub struct PendingIrpList {
    entries: Mutex<HashMap<u64, IrpEntry>>,
}

impl PendingIrpList {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, IrpEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, entry: IrpEntry) -> Result<(), DuplicateSerial> {
        let len = {
            let mut map = self.lock();
            if map.contains_key(&entry.serial_number) {
                return Err(DuplicateSerial(entry));
            }
            map.insert(entry.serial_number, entry);
            map.len()
        };
        metrics::gauge!(METRIC_PENDING_IRPS).set(len as f64);
        Ok(())
    }

    /// Take the entry matching a response. `None` for stale or cancelled serials.
    pub fn remove(&self, serial_number: u64) -> Option<IrpEntry> {
        let (entry, len) = {
            let mut map = self.lock();
            let entry = map.remove(&serial_number);
            (entry, map.len())
        };
        metrics::gauge!(METRIC_PENDING_IRPS).set(len as f64);
        entry
    }

    /// Same as [`remove`](Self::remove), used when the caller gave up.
    pub fn cancel(&self, serial_number: u64) -> Option<IrpEntry> {
        let entry = self.remove(serial_number);
        match &entry {
            Some(_) => log::debug!("serial {serial_number} cancelled"),
            None => log::debug!("cancel for serial {serial_number}: not pending"),
        }
        entry
    }

    /// Remove every entry registered more than `timeout` before `now`.
    pub fn take_expired(&self, now: Instant, timeout: Duration) -> Vec<IrpEntry> {
        let (expired, len) = {
            let mut map = self.lock();
            let stale: Vec<u64> = map
                .iter()
                .filter(|(_, e)| now.saturating_duration_since(e.registered_at) > timeout)
                .map(|(serial, _)| *serial)
                .collect();
            let expired: Vec<IrpEntry> = stale.iter().filter_map(|s| map.remove(s)).collect();
            (expired, map.len())
        };
        metrics::gauge!(METRIC_PENDING_IRPS).set(len as f64);
        expired
    }

    pub fn drain(&self) -> Vec<IrpEntry> {
        let drained: Vec<IrpEntry> = self.lock().drain().map(|(_, e)| e).collect();
        metrics::gauge!(METRIC_PENDING_IRPS).set(0.0);
        drained
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
