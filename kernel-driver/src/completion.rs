//! Matching service responses to pending requests.

use shared::{NtStatus, ResponseMessage};

use crate::{
    consts::METRIC_STALE_RESPONSES,
    device::Dcb,
    dispatch::Dispatcher,
    irp::IoStatusBlock,
    mdl::Mdl,
};

/// Route `response` to the completion routine of the request it answers.
///
/// Returns `false` for a stale serial (already cancelled, timed out or
/// never issued); nothing is touched in that case.
pub fn complete_event(dcb: &Dcb, dispatcher: &Dispatcher, response: ResponseMessage) -> bool {
    let serial = response.serial_number;
    let Some(entry) = dcb.pending.remove(serial) else {
        log::warn!("response for serial {serial} matches no pending request, ignored");
        metrics::counter!(METRIC_STALE_RESPONSES).increment(1);
        return false;
    };

    let major = entry.irp.major_function;
    match dispatcher.completion_for(major) {
        Some(routine) => routine(entry, response),
        None => {
            log::error!("no completion routine for major 0x{major:02x}");
            entry.finish(NtStatus::InvalidParameter, 0);
        }
    }
    true
}

/// Decide the outcome of a variable-length result against a caller buffer
/// of `buffer_length` bytes, copying into `mdl` only on success.
///
/// * success that fits, with a mapping → bytes copied, `Success`
/// * overflow, or success that does not fit → `BufferOverflow`, required size
/// * anything else → `InvalidParameter`, 0
pub fn negotiate_buffer(response: &ResponseMessage, buffer_length: u32, mdl: Option<&Mdl>) -> IoStatusBlock {
    let len = response.result_length;
    match (response.status, mdl) {
        (NtStatus::Success, Some(mdl))
            if len <= buffer_length && response.buffer.len() >= len as usize =>
        {
            let written = mdl.write(&response.buffer[..len as usize]);
            IoStatusBlock { status: NtStatus::Success, information: written as u64 }
        }
        (NtStatus::BufferOverflow, _) => {
            IoStatusBlock { status: NtStatus::BufferOverflow, information: len.into() }
        }
        (NtStatus::Success, _) if len > buffer_length => {
            IoStatusBlock { status: NtStatus::BufferOverflow, information: len.into() }
        }
        _ => IoStatusBlock { status: NtStatus::InvalidParameter, information: 0 },
    }
}
