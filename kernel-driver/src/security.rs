/*!
 * kernel-driver/src/security.rs
 *
 * IRP_MJ_QUERY_SECURITY and IRP_MJ_SET_SECURITY.
 *
 * Query is forwarded to the service unless `immediate_security` is set, in
 * which case a header-only self-relative descriptor is returned on the spot.
 * Set is accepted synchronously; applying the descriptor belongs to the
 * access-control subsystem.
 */

use shared::{security::DescriptorBuilder, NtStatus, ResponseMessage, SecurityInformation};

use crate::{
    completion::negotiate_buffer,
    device::{complete, DeviceObject},
    error::DispatchError,
    event_context::allocate_event_context,
    helpers::{file_object, open_context},
    irp::{Irp, Parameters},
    pending::IrpEntry,
};

/// IRP_MJ_QUERY_SECURITY dispatch routine.
pub fn dispatch_query_security(device: &DeviceObject, irp: Irp) -> NtStatus {
    log::trace!("==> query_security");
    let status = query_security(device, irp);
    log::trace!("<== query_security: {status}");
    status
}

fn query_security(device: &DeviceObject, irp: Irp) -> NtStatus {
    let validated = open_context(&irp).and_then(|ccb| Ok((device.volume()?, ccb)));
    let (vcb, ccb) = match validated {
        Ok(v) => v,
        Err(e) => {
            log::debug!("query_security rejected: {e}");
            return complete(irp, e.status(), 0);
        }
    };
    let dcb = &vcb.dcb;

    let Parameters::QuerySecurity { security_information, length } = irp.parameters else {
        log::debug!("query_security without query parameters");
        return complete(irp, NtStatus::InvalidParameter, 0);
    };

    log::debug!(
        "  pid {} file {} info {security_information} length {length}",
        irp.requestor_process_id,
        ccb.fcb.file_name
    );

    if dcb.config.immediate_security {
        return query_security_immediate(irp, security_information, length);
    }

    let mut event = match allocate_event_context(dcb, &irp, &ccb) {
        Ok(event) => event,
        Err(e) => {
            log::warn!("query_security: {e}");
            return complete(irp, e.status(), 0);
        }
    };

    // Lock the caller's buffer so the completion can fill it from another context.
    let mapping = match &irp.user_buffer {
        Some(buffer) if length > 0 => Some(dcb.mapper.allocate(buffer, length)),
        _ => None,
    };
    let mdl = match mapping.transpose() {
        Ok(mdl) => mdl,
        Err(e) => {
            let e = DispatchError::from(e);
            log::warn!("query_security: {e}");
            drop(event);
            return complete(irp, e.status(), 0);
        }
    };

    event.security_information = security_information;
    event.buffer_length = length;

    dcb.register_pending_irp(irp, mdl, event)
}

/// Answer from the driver itself with a header-only descriptor.
fn query_security_immediate(irp: Irp, info: SecurityInformation, length: u32) -> NtStatus {
    let descriptor = DescriptorBuilder::minimal();
    let needed = descriptor.len();
    log::debug!("  immediate descriptor for {info}: {needed} bytes");

    let fits = (length as usize) >= needed
        && irp.user_buffer.as_ref().is_some_and(|b| b.len() >= needed);
    if !fits {
        return complete(irp, NtStatus::BufferOverflow, needed as u64);
    }

    let written = irp
        .user_buffer
        .as_ref()
        .map_or(0, |buffer| buffer.write_prefix(&descriptor));
    complete(irp, NtStatus::Success, written as u64)
}

/// Completion routine for IRP_MJ_QUERY_SECURITY.
pub fn complete_query_security(entry: IrpEntry, response: ResponseMessage) {
    log::trace!("==> complete_query_security serial {}", entry.serial_number);
    let buffer_length = match entry.irp.parameters {
        Parameters::QuerySecurity { length, .. } => length,
        _ => 0,
    };
    let block = negotiate_buffer(&response, buffer_length, entry.mdl.as_ref());
    entry.finish(block.status, block.information);
    log::trace!("<== complete_query_security: {}", block.status);
}

/// IRP_MJ_SET_SECURITY dispatch routine.
pub fn dispatch_set_security(device: &DeviceObject, irp: Irp) -> NtStatus {
    log::trace!("==> set_security");
    let checked = file_object(&irp).and_then(|fo| {
        device.volume()?;
        Ok(fo.file_name.clone())
    });
    let status = match checked {
        Ok(name) => {
            log::debug!("  pid {} file {name}", irp.requestor_process_id);
            complete(irp, NtStatus::Success, 0)
        }
        Err(e) => {
            log::debug!("set_security rejected: {e}");
            complete(irp, e.status(), 0)
        }
    };
    log::trace!("<== set_security: {status}");
    status
}
