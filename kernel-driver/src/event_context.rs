//! Building the `EventContext` that describes a request to the service.

use shared::{constants::EVENT_CONTEXT_HEADER_LEN, unicode::to_utf16le, EventContext, SecurityInformation};

use crate::{device::Dcb, error::DispatchError, irp::{Ccb, Irp}};

/// Allocate the common part of an event for `irp`: a fresh serial number,
/// requestor, major function, the per-open user value and the file name.
///
/// Operation fields are left zeroed for the caller to fill in. Fails when
/// the encoded size would exceed `max_event_size`.
pub fn allocate_event_context(dcb: &Dcb, irp: &Irp, ccb: &Ccb) -> Result<EventContext, DispatchError> {
    let file_name = to_utf16le(&ccb.fcb.file_name);
    let size = EVENT_CONTEXT_HEADER_LEN + file_name.len();
    let limit = dcb.config.max_event_size;
    if size > limit {
        return Err(DispatchError::EventTooLarge { size, limit });
    }

    Ok(EventContext {
        major_function: irp.major_function,
        serial_number: dcb.next_serial_number(),
        process_id: irp.requestor_process_id,
        security_information: SecurityInformation::default(),
        context: ccb.user_context,
        buffer_length: 0,
        file_name,
    })
}
