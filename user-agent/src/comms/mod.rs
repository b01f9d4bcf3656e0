//! Driver ↔ service plumbing.
//!
//!   * `listeners` drain the driver's event queue on blocking threads and
//!     hand decoded `EventContext`s to the async side.
//!   * `router` calls the `FileSystem` and sends the answer back.

pub mod listeners;
pub mod router;

pub use listeners::{EventQueueListener, Listener};
pub use router::Router;

/*────────── metrics ─────────*/

pub const METRIC_EVENTS_RECEIVED: &str = "umfs_agent_events_received_total";
pub const METRIC_MALFORMED_EVENTS: &str = "umfs_agent_malformed_events_total";
pub const METRIC_RESPONSES: &str = "umfs_agent_responses_total";
