use super::checkpoint::NamespaceImage;
use super::{Journal, JournalContents, JournalRecord};
use crate::prelude::*;
use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Inner {
    image: Option<NamespaceImage>,
    records: Vec<JournalRecord>,
    failing_appends: usize,
    appends: usize,
}

/// Journal held in memory. Clones share the same contents, so a test can
/// hand one clone to a node, drop the node, and recover from another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJournal {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` appends fail as if the disk rejected the write.
    pub fn fail_next_appends(&self, n: usize) {
        self.inner.lock().failing_appends = n;
    }

    pub fn records(&self) -> Vec<JournalRecord> {
        self.inner.lock().records.clone()
    }

    pub fn image(&self) -> Option<NamespaceImage> {
        self.inner.lock().image.clone()
    }

    /// Number of successful appends so far
    pub fn append_count(&self) -> usize {
        self.inner.lock().appends
    }
}

#[async_trait]
impl Journal for InMemoryJournal {
    async fn load(&mut self) -> Result<JournalContents> {
        let inner = self.inner.lock();
        Ok(JournalContents {
            image: inner.image.clone(),
            records: inner.records.clone(),
            torn_bytes: 0,
        })
    }

    async fn append(&mut self, records: &[JournalRecord]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.failing_appends > 0 {
            inner.failing_appends -= 1;
            return Err(Error::JournalWriteFailure(std::io::Error::other(
                "injected journal failure",
            )));
        }
        inner.records.extend_from_slice(records);
        inner.appends += 1;
        Ok(())
    }

    async fn checkpoint(&mut self, image: &NamespaceImage) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.records.retain(|r| r.txid > image.last_txid);
        inner.image = Some(image.clone());
        Ok(())
    }
}
