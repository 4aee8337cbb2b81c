// Boundary with the block storage layer. The namespace only records which
// blocks a file owns and how much of it is durable; the bytes live elsewhere.

use crate::prelude::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockHandle(pub u64);

impl std::fmt::Display for BlockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "blk_{}", self.0)
    }
}

#[async_trait]
pub trait BlockStore: Send + Sync + std::fmt::Debug {
    async fn allocate_block(&self, file: InodeId) -> Result<BlockHandle>;
    async fn finalize(&self, file: InodeId, last_block_length: u64) -> Result<()>;
}

#[derive(Debug)]
pub struct InMemoryBlockStore {
    next_block: AtomicU64,
    allocated: Mutex<BTreeMap<InodeId, Vec<BlockHandle>>>,
    finalized: Mutex<BTreeMap<InodeId, u64>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self {
            next_block: AtomicU64::new(1),
            allocated: Mutex::new(BTreeMap::new()),
            finalized: Mutex::new(BTreeMap::new()),
        }
    }

    /// Last block length reported for `file`, if it was finalized.
    pub fn finalized_length(&self, file: InodeId) -> Option<u64> {
        self.finalized.lock().get(&file).copied()
    }

    pub fn blocks_of(&self, file: InodeId) -> Vec<BlockHandle> {
        self.allocated.lock().get(&file).cloned().unwrap_or_default()
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn allocate_block(&self, file: InodeId) -> Result<BlockHandle> {
        let block = BlockHandle(self.next_block.fetch_add(1, Ordering::SeqCst));
        self.allocated.lock().entry(file).or_default().push(block);
        Ok(block)
    }

    async fn finalize(&self, file: InodeId, last_block_length: u64) -> Result<()> {
        self.finalized.lock().insert(file, last_block_length);
        Ok(())
    }
}
