//! Names and numbers private to the driver.

/*────────── device names ─────────*/

pub const DISK_DEVICE_NAME: &str = r"\Device\UmfsDisk";
pub const VOLUME_DEVICE_NAME: &str = r"\Device\UmfsVolume";
pub const GLOBAL_DEVICE_NAME: &str = r"\Device\Umfs";

/// First correlation token handed out by a disk.
pub const FIRST_SERIAL_NUMBER: u64 = 1;

/*────────── metrics ─────────*/

pub const METRIC_DISPATCHED: &str = "umfs_irp_dispatched_total";
pub const METRIC_COMPLETED: &str = "umfs_irp_completed_total";
pub const METRIC_PENDING_IRPS: &str = "umfs_pending_irps";
pub const METRIC_STALE_RESPONSES: &str = "umfs_stale_responses_total";
