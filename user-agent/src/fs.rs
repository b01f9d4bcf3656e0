//! The callbacks a user-mode file system implements.
//!
//! The driver forwards a request as an `EventContext`; the router turns it
//! into one of these calls and the returned value into a `ResponseMessage`.
//! Every method has a default that answers `NotImplemented`, so an
//! implementation only overrides what it supports.

use async_trait::async_trait;
use shared::{security::DescriptorBuilder, EventContext, NtStatus, SecurityInformation};

use crate::config::{model::ServiceConfig, ConfigError};

/// One query-security request, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityRequest {
    pub file_name: String,
    pub process_id: u32,
    pub security_information: SecurityInformation,
    /// Value the file system attached to the handle at open time.
    pub context: u64,
    /// Capacity of the caller's buffer; a larger answer is an overflow.
    pub buffer_length: u32,
}

impl From<&EventContext> for SecurityRequest {
    fn from(ev: &EventContext) -> Self {
        Self {
            file_name: ev.file_name_lossy(),
            process_id: ev.process_id,
            security_information: ev.security_information,
            context: ev.context,
            buffer_length: ev.buffer_length,
        }
    }
}

#[async_trait]
pub trait FileSystem: Send + Sync + 'static {
    /// Self-relative security descriptor for `request.file_name`.
    ///
    /// Return the whole descriptor even when it is larger than
    /// `buffer_length`; the caller negotiates the size.
    async fn get_file_security(&self, request: &SecurityRequest) -> Result<Vec<u8>, NtStatus> {
        let _ = request;
        Err(NtStatus::NotImplemented)
    }
}

/// Answers every query with the same owner and group.
#[derive(Debug, Clone, Default)]
pub struct StaticSecurity {
    builder: DescriptorBuilder,
}

impl StaticSecurity {
    pub fn new(builder: DescriptorBuilder) -> Self {
        Self { builder }
    }

    pub fn from_config(cfg: &ServiceConfig) -> Result<Self, ConfigError> {
        let builder = DescriptorBuilder::new().owner(cfg.owner()?).group(cfg.group()?);
        Ok(Self { builder })
    }
}

#[async_trait]
impl FileSystem for StaticSecurity {
    async fn get_file_security(&self, request: &SecurityRequest) -> Result<Vec<u8>, NtStatus> {
        log::debug!(
            "get_file_security {} for pid {} ({})",
            request.file_name,
            request.process_id,
            request.security_information
        );
        Ok(self.builder.build(request.security_information))
    }
}
