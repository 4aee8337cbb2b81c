use crate::leases::DEFAULT_LEASE_TIMEOUT;
use crate::prelude::*;
use std::env;

/// Settings for one namespace node.
///
/// Loaded from a JSON file, then overridden by `LIS_*` environment
/// variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameNodeConfig {
    /// Directory holding the journal and checkpoint image
    pub storage_dir: PathBuf,
    pub lease_timeout_ms: u64,
    pub monitor_interval_ms: u64,
    /// Records between automatic checkpoints
    pub checkpoint_txns: u64,
    pub block_size: u64,
    /// Capacity of the sequencer's command queue
    pub command_queue: usize,
}

impl Default for NameNodeConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("lisns-data"),
            lease_timeout_ms: DEFAULT_LEASE_TIMEOUT.as_millis() as u64,
            monitor_interval_ms: 1_000,
            checkpoint_txns: 10_000,
            block_size: DEFAULT_BLOCK_SIZE,
            command_queue: 1_024,
        }
    }
}

impl NameNodeConfig {
    pub fn with_storage_dir(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            ..Default::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Applies `LIS_STORAGE_DIR`, `LIS_LEASE_TIMEOUT_MS`,
    /// `LIS_MONITOR_INTERVAL_MS` and `LIS_CHECKPOINT_TXNS`.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(dir) = lookup("LIS_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup("LIS_LEASE_TIMEOUT_MS") {
            self.lease_timeout_ms = parse_u64("LIS_LEASE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("LIS_MONITOR_INTERVAL_MS") {
            self.monitor_interval_ms = parse_u64("LIS_MONITOR_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("LIS_CHECKPOINT_TXNS") {
            self.checkpoint_txns = parse_u64("LIS_CHECKPOINT_TXNS", &value)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let zero = |field: &str| Err(Error::Config(format!("{field} must be greater than zero")));
        if self.lease_timeout_ms == 0 {
            return zero("lease_timeout_ms");
        }
        if self.monitor_interval_ms == 0 {
            return zero("monitor_interval_ms");
        }
        if self.checkpoint_txns == 0 {
            return zero("checkpoint_txns");
        }
        if self.block_size == 0 {
            return zero("block_size");
        }
        if self.command_queue == 0 {
            return zero("command_queue");
        }
        Ok(())
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}={value:?} is not a number")))
}
