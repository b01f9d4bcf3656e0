//! Synchronous rejection reasons of a dispatch routine.

use shared::{NtStatus, WireError};
use thiserror::Error;

use crate::{communications::event_queue::QueueError, mdl::MappingError};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Missing file object, per-open context, or wrong device.
    #[error("invalid request: {0}")]
    Validation(&'static str),

    #[error("buffer mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("event context of {size} bytes exceeds the {limit}-byte limit")]
    EventTooLarge { size: usize, limit: usize },

    #[error("event encoding failed: {0}")]
    Wire(#[from] WireError),

    #[error("hand-off to service failed: {0}")]
    Queue(#[from] QueueError),
}

impl DispatchError {
    /// Status the request is finalized with.
    pub fn status(&self) -> NtStatus {
        match self {
            DispatchError::Validation(_) => NtStatus::InvalidParameter,
            DispatchError::Mapping(_)
            | DispatchError::EventTooLarge { .. }
            | DispatchError::Wire(_)
            | DispatchError::Queue(_) => NtStatus::InsufficientResources,
        }
    }
}
