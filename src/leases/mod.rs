// Write leases on namespace files
//
// Provides single-writer ownership of open files with:
// - leases keyed by inode id, so renames never touch them
// - per-holder index for heartbeat renewal
// - periodic expiry through the node's mutation path

pub mod lease;
pub mod monitor;
pub mod table;

pub use lease::{HolderId, Lease, DEFAULT_LEASE_TIMEOUT};
pub use monitor::LeaseMonitor;
pub use table::LeaseTable;
