pub use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

pub use serde::{Deserialize, Serialize};
#[allow(unused)]
pub use tracing::{debug, error, info, warn};

pub use crate::error::{Error, Result};
pub use crate::hlc::{Hlc, HlcTimestamp};
pub use crate::namespace::InodeId;

/// Longest single path segment accepted by the namespace
pub const MAX_NAME_LENGTH: usize = 255;

/// Default block size handed to the storage layer (64 MiB)
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

pub const PATH_SEPARATOR: char = '/';
