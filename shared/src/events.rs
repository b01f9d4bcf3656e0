//! Frames exchanged between the driver and the user-mode service.
//!
//! ```text
//!  EventContext (driver → service), little-endian, unaligned
//!  ┌──────┬───────┬────────┬─────┬─────────┬──────────┬────────┬─────────┬───────────┐
//!  │ len  │ major │ serial │ pid │ sec.info│ context  │ buflen │ namelen │ name …    │
//!  │ u32  │ u32   │ u64    │ u32 │ u32     │ u64      │ u32    │ u32     │ namelen B │
//!  └──────┴───────┴────────┴─────┴─────────┴──────────┴────────┴─────────┴───────────┘
//!
//!  ResponseMessage (service → driver)
//!  ┌────────┬────────┬────────┬──────────────┐
//!  │ serial │ status │ reslen │ result …     │
//!  │ u64    │ u32    │ u32    │              │
//!  └────────┴────────┴────────┴──────────────┘
//! ```
//!
//! `reslen` is the *reported* result length. On success the trailing bytes
//! are exactly `reslen` long; on overflow `reslen` is the required size and
//! no bytes follow.
//!
//! Dump files concatenate frames as `u32 len ++ frame` (see [`FrameReader`]).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    constants::{EVENT_CONTEXT_HEADER_LEN, RESPONSE_HEADER_LEN},
    security::SecurityInformation,
    status::NtStatus,
    unicode::from_utf16le_lossy,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("frame too short: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("length field says {declared} bytes, frame has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("payload of {0} bytes does not fit a u32 length field")]
    TooLarge(usize),
}

/*──────────────────────────── cursor helpers ────────────────────────────*/

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

fn checked_u32(n: usize) -> Result<u32, WireError> {
    u32::try_from(n).map_err(|_| WireError::TooLarge(n))
}

/*──────────────────────────── EventContext ──────────────────────────────*/

/// One request as seen by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    pub major_function: u32,
    /// Correlation token echoed back in the response.
    pub serial_number: u64,
    pub process_id: u32,
    pub security_information: SecurityInformation,
    /// Opaque per-open value supplied by the service at open time.
    pub context: u64,
    pub buffer_length: u32,
    /// UTF-16LE bytes.
    pub file_name: Vec<u8>,
}

impl EventContext {
    pub fn encoded_len(&self) -> usize {
        EVENT_CONTEXT_HEADER_LEN + self.file_name.len()
    }

    pub fn file_name_lossy(&self) -> String {
        from_utf16le_lossy(&self.file_name)
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let total = checked_u32(self.encoded_len())?;
        let name_len = checked_u32(self.file_name.len())?;

        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&total.to_le_bytes());
        out.extend_from_slice(&self.major_function.to_le_bytes());
        out.extend_from_slice(&self.serial_number.to_le_bytes());
        out.extend_from_slice(&self.process_id.to_le_bytes());
        out.extend_from_slice(&self.security_information.bits().to_le_bytes());
        out.extend_from_slice(&self.context.to_le_bytes());
        out.extend_from_slice(&self.buffer_length.to_le_bytes());
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&self.file_name);
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < EVENT_CONTEXT_HEADER_LEN {
            return Err(WireError::Truncated { need: EVENT_CONTEXT_HEADER_LEN, have: buf.len() });
        }
        let mut r = Reader::new(buf);
        let declared = r.u32() as usize;
        if declared != buf.len() {
            return Err(WireError::LengthMismatch { declared, actual: buf.len() });
        }
        let major_function = r.u32();
        let serial_number = r.u64();
        let process_id = r.u32();
        let security_information = SecurityInformation(r.u32());
        let context = r.u64();
        let buffer_length = r.u32();
        let name_len = r.u32() as usize;

        let name = r.rest();
        if name_len != name.len() {
            return Err(WireError::LengthMismatch { declared: name_len, actual: name.len() });
        }

        Ok(Self {
            major_function,
            serial_number,
            process_id,
            security_information,
            context,
            buffer_length,
            file_name: name.to_vec(),
        })
    }
}

/*──────────────────────────── ResponseMessage ───────────────────────────*/

/// The service's answer to one `EventContext`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub serial_number: u64,
    pub status: NtStatus,
    /// Bytes produced, or bytes required when `status` is an overflow.
    pub result_length: u32,
    pub buffer: Vec<u8>,
}

impl ResponseMessage {
    pub fn success(serial_number: u64, buffer: Vec<u8>) -> Result<Self, WireError> {
        let result_length = checked_u32(buffer.len())?;
        Ok(Self { serial_number, status: NtStatus::Success, result_length, buffer })
    }

    pub fn overflow(serial_number: u64, required: u32) -> Self {
        Self {
            serial_number,
            status: NtStatus::BufferOverflow,
            result_length: required,
            buffer: Vec::new(),
        }
    }

    pub fn error(serial_number: u64, status: NtStatus) -> Self {
        Self { serial_number, status, result_length: 0, buffer: Vec::new() }
    }

    pub fn encoded_len(&self) -> usize {
        RESPONSE_HEADER_LEN + self.buffer.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.serial_number.to_le_bytes());
        out.extend_from_slice(&self.status.code().to_le_bytes());
        out.extend_from_slice(&self.result_length.to_le_bytes());
        out.extend_from_slice(&self.buffer);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < RESPONSE_HEADER_LEN {
            return Err(WireError::Truncated { need: RESPONSE_HEADER_LEN, have: buf.len() });
        }
        let mut r = Reader::new(buf);
        let serial_number = r.u64();
        let status = NtStatus::from_code(r.u32());
        let result_length = r.u32();
        let payload = r.rest();

        // Only a successful answer is required to carry its bytes.
        if status == NtStatus::Success && payload.len() != result_length as usize {
            return Err(WireError::LengthMismatch {
                declared: result_length as usize,
                actual: payload.len(),
            });
        }

        Ok(Self { serial_number, status, result_length, buffer: payload.to_vec() })
    }
}

/*──────────────────────────── frame streams ─────────────────────────────*/

/// Append `frame` to `out` with a `u32` little-endian length prefix.
pub fn write_frame(out: &mut Vec<u8>, frame: &[u8]) -> Result<(), WireError> {
    out.extend_from_slice(&checked_u32(frame.len())?.to_le_bytes());
    out.extend_from_slice(frame);
    Ok(())
}

/// Iterates length-prefixed frames; stops with an error on a torn tail.
pub struct FrameReader<'a> {
    raw: &'a [u8],
    cursor: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(raw: &'a [u8]) -> Self {
        Self { raw, cursor: 0 }
    }

    pub fn offset(&self) -> usize {
        self.cursor
    }
}

impl<'a> Iterator for FrameReader<'a> {
    type Item = Result<&'a [u8], WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        let left = self.raw.len() - self.cursor;
        if left == 0 {
            return None;
        }
        if left < 4 {
            self.cursor = self.raw.len();
            return Some(Err(WireError::Truncated { need: 4, have: left }));
        }
        let mut r = Reader::new(&self.raw[self.cursor..]);
        let len = r.u32() as usize;
        let body = r.rest();
        if body.len() < len {
            self.cursor = self.raw.len();
            return Some(Err(WireError::Truncated { need: len, have: body.len() }));
        }
        self.cursor += 4 + len;
        Some(Ok(&body[..len]))
    }
}
