/*────────── major function codes (WDM numbering) ─────────*/

pub const IRP_MJ_CREATE: u32 = 0x00;
pub const IRP_MJ_CLOSE: u32 = 0x02;
pub const IRP_MJ_READ: u32 = 0x03;
pub const IRP_MJ_WRITE: u32 = 0x04;
pub const IRP_MJ_DEVICE_CONTROL: u32 = 0x0e;
pub const IRP_MJ_QUERY_SECURITY: u32 = 0x14;
pub const IRP_MJ_SET_SECURITY: u32 = 0x15;
/// Number of dispatch slots (0–27).
pub const IRP_MJ_SLOTS: usize = 28;

/*────────── wire sizes ─────────*/

/// Fixed part of an encoded `EventContext`.
pub const EVENT_CONTEXT_HEADER_LEN: usize = 40;
/// Fixed part of an encoded `ResponseMessage`.
pub const RESPONSE_HEADER_LEN: usize = 16;
/// Self-relative descriptor header with no owner, group or ACLs.
pub const SECURITY_DESCRIPTOR_MIN_LEN: usize = 20;

/*────────── defaults ─────────*/

pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_MAX_EVENT_SIZE: usize = 64 * 1024;
pub const DEFAULT_MAX_LOCKED_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_PENDING_TIMEOUT_SECS: u64 = 15;
