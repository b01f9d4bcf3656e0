//! NT-style status codes as seen by the caller and carried on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NtStatus {
    Success,
    /// Transient: the request was handed off and will be finalized later.
    Pending,
    BufferOverflow,
    InvalidParameter,
    InsufficientResources,
    NotImplemented,
    Cancelled,
    AccessDenied,
    Other(u32),
}

impl NtStatus {
    pub const fn code(self) -> u32 {
        match self {
            NtStatus::Success => 0x0000_0000,
            NtStatus::Pending => 0x0000_0103,
            NtStatus::BufferOverflow => 0x8000_0005,
            NtStatus::InvalidParameter => 0xC000_000D,
            NtStatus::InsufficientResources => 0xC000_009A,
            NtStatus::NotImplemented => 0xC000_0002,
            NtStatus::Cancelled => 0xC000_0120,
            NtStatus::AccessDenied => 0xC000_0022,
            NtStatus::Other(code) => code,
        }
    }

    pub const fn from_code(code: u32) -> Self {
        match code {
            0x0000_0000 => NtStatus::Success,
            0x0000_0103 => NtStatus::Pending,
            0x8000_0005 => NtStatus::BufferOverflow,
            0xC000_000D => NtStatus::InvalidParameter,
            0xC000_009A => NtStatus::InsufficientResources,
            0xC000_0002 => NtStatus::NotImplemented,
            0xC000_0120 => NtStatus::Cancelled,
            0xC000_0022 => NtStatus::AccessDenied,
            other => NtStatus::Other(other),
        }
    }

    /// Symbolic name, usable as a metrics label.
    pub const fn name(self) -> &'static str {
        match self {
            NtStatus::Success => "STATUS_SUCCESS",
            NtStatus::Pending => "STATUS_PENDING",
            NtStatus::BufferOverflow => "STATUS_BUFFER_OVERFLOW",
            NtStatus::InvalidParameter => "STATUS_INVALID_PARAMETER",
            NtStatus::InsufficientResources => "STATUS_INSUFFICIENT_RESOURCES",
            NtStatus::NotImplemented => "STATUS_NOT_IMPLEMENTED",
            NtStatus::Cancelled => "STATUS_CANCELLED",
            NtStatus::AccessDenied => "STATUS_ACCESS_DENIED",
            NtStatus::Other(_) => "STATUS_OTHER",
        }
    }

    /// `NT_SUCCESS`: informational and success severities.
    pub const fn is_success(self) -> bool {
        self.code() < 0x8000_0000
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.code())
    }
}
