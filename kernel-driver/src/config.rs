//! Driver tunables, normally the `[driver]` table of the agent's config.

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use shared::constants::{
    DEFAULT_EVENT_QUEUE_CAPACITY, DEFAULT_MAX_EVENT_SIZE, DEFAULT_MAX_LOCKED_BYTES,
    DEFAULT_PENDING_TIMEOUT_SECS,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Answer query-security in the driver with a minimal descriptor
    /// instead of asking the service.
    pub immediate_security: bool,
    pub event_queue_capacity: usize,
    /// Budget for buffers locked on behalf of pending requests.
    pub max_locked_bytes: usize,
    /// Largest encoded `EventContext` the driver will allocate.
    pub max_event_size: usize,
    #[serde(deserialize_with = "duration_from_str")]
    pub pending_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            immediate_security: false,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            max_locked_bytes: DEFAULT_MAX_LOCKED_BYTES,
            max_event_size: DEFAULT_MAX_EVENT_SIZE,
            pending_timeout: Duration::from_secs(DEFAULT_PENDING_TIMEOUT_SECS),
        }
    }
}

/// `"15s"`, `"2m 30s"`, … via humantime.
fn duration_from_str<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(de)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}
