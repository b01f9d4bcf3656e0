//! Types that cross the driver ↔ agent boundary.
//!
//! Both sides link this crate so the frame layout, the status codes and the
//! security-information mask can never drift apart.

pub mod constants;
pub mod events;
pub mod security;
pub mod status;
pub mod unicode;

pub use events::{EventContext, ResponseMessage, WireError};
pub use security::SecurityInformation;
pub use status::NtStatus;
