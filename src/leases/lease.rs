// Core lease data structures

use crate::prelude::*;

/// Default lease timeout (60 seconds without a renewal)
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(60);

/// Opaque identity of a client writing to the namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HolderId(pub String);

impl HolderId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HolderId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl std::fmt::Display for HolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exclusive write claim of one holder on one file.
///
/// Keyed by inode id only, so renaming the file or any ancestor leaves the
/// lease untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lease {
    pub holder: HolderId,
    pub file: InodeId,
    pub last_renewed: HlcTimestamp,
}

impl Lease {
    pub fn new(holder: HolderId, file: InodeId, granted_at: HlcTimestamp) -> Self {
        Self {
            holder,
            file,
            last_renewed: granted_at,
        }
    }

    /// Expired once strictly more than `timeout` has passed since the last
    /// renewal.
    pub fn is_expired(&self, now: HlcTimestamp, timeout: Duration) -> bool {
        now.millis_since(self.last_renewed) > timeout.as_millis() as u64
    }

    /// Time left before the lease can be reclaimed
    pub fn time_remaining(&self, now: HlcTimestamp, timeout: Duration) -> Option<Duration> {
        let elapsed = now.millis_since(self.last_renewed);
        let timeout_ms = timeout.as_millis() as u64;
        if elapsed > timeout_ms {
            None
        } else {
            Some(Duration::from_millis(timeout_ms - elapsed))
        }
    }

    /// Renewals never move the timestamp backwards.
    pub fn renew(&mut self, at: HlcTimestamp) {
        self.last_renewed = self.last_renewed.max(at);
    }
}
