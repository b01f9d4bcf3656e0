//! dispatch.rs
//! Dispatch and completion tables indexed by IRP major function.

use shared::{constants::IRP_MJ_SLOTS, NtStatus, ResponseMessage};

use crate::{
    consts::METRIC_DISPATCHED,
    device::{complete, DeviceObject},
    helpers::major_function_name,
    irp::Irp,
    pending::IrpEntry,
};

/// Prototype for IRP handlers. Returns `Pending` or the final status.
pub type DispatchFn = fn(device: &DeviceObject, irp: Irp) -> NtStatus;

/// Prototype for completion routines: finalize `entry` from `response`.
pub type CompleteFn = fn(entry: IrpEntry, response: ResponseMessage);

/// Default handler: completes IRP with `NotImplemented`.
fn default_handler(_device: &DeviceObject, irp: Irp) -> NtStatus {
    complete(irp, NtStatus::NotImplemented, 0)
}

/// Dispatcher holds handlers for each major function (0–27).
pub struct Dispatcher {
    handlers: [DispatchFn; IRP_MJ_SLOTS],
    completions: [Option<CompleteFn>; IRP_MJ_SLOTS],
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// All slots initialize to `default_handler`, no completion routines.
    pub const fn new() -> Self {
        Self {
            handlers: [default_handler as DispatchFn; IRP_MJ_SLOTS],
            completions: [None; IRP_MJ_SLOTS],
        }
    }

    /// Register a handler for a given IRP major code.
    pub fn register(&mut self, major_fn: u32, handler: DispatchFn) {
        if let Some(slot) = self.handlers.get_mut(major_fn as usize) {
            *slot = handler;
        }
    }

    /// Register the routine that finalizes responses for `major_fn`.
    pub fn register_completion(&mut self, major_fn: u32, routine: CompleteFn) {
        if let Some(slot) = self.completions.get_mut(major_fn as usize) {
            *slot = Some(routine);
        }
    }

    pub fn dispatch(&self, device: &DeviceObject, irp: Irp) -> NtStatus {
        let major = irp.major_function;
        metrics::counter!(METRIC_DISPATCHED, "major" => major_function_name(major)).increment(1);
        match self.handlers.get(major as usize) {
            Some(handler) => handler(device, irp),
            None => {
                log::warn!("major function 0x{major:02x} out of range");
                complete(irp, NtStatus::InvalidParameter, 0)
            }
        }
    }

    pub fn completion_for(&self, major_fn: u32) -> Option<CompleteFn> {
        self.completions.get(major_fn as usize).copied().flatten()
    }
}
