// Write-ahead journal and checkpoint images
//
// Every namespace mutation is appended here and made durable before it is
// applied in memory. A checkpoint writes the full state and drops the journal
// prefix it covers; recovery loads the newest image and replays the rest.

pub mod checkpoint;
pub mod codec;
pub mod file;
pub mod memory;
pub mod record;

pub use checkpoint::NamespaceImage;
pub use file::{FileJournal, WriteFault};
pub use memory::InMemoryJournal;
pub use record::{JournalRecord, Op, JOURNAL_VERSION};

use crate::prelude::*;
use async_trait::async_trait;

/// What a journal holds on startup.
#[derive(Debug, Clone, Default)]
pub struct JournalContents {
    pub image: Option<NamespaceImage>,
    /// Records in append order, possibly including some the image covers
    pub records: Vec<JournalRecord>,
    /// Bytes of an incomplete final frame that were discarded
    pub torn_bytes: usize,
}

#[async_trait]
pub trait Journal: Send + Sync + std::fmt::Debug {
    /// Reads the newest image and every record after it.
    async fn load(&mut self) -> Result<JournalContents>;

    /// Durably appends one operation's records. Returns only once they would
    /// survive a crash; any failure is `JournalWriteFailure`.
    async fn append(&mut self, records: &[JournalRecord]) -> Result<()>;

    /// Atomically replaces the image, then drops records it covers.
    async fn checkpoint(&mut self, image: &NamespaceImage) -> Result<()>;
}
