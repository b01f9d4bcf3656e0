//! Driver → service transport.
//!
//! Encoded `EventContext` frames leave the driver through a bounded queue the
//! service drains; answers come back through `Driver::complete_event`.

pub mod event_queue;
