// In-memory namespace state: the tree, the lease table, and the position in
// the journal they reflect.
//
// Mutations come in two halves. `plan_*` methods validate a request against
// the current state and return the journal ops it needs, touching nothing.
// `apply` executes one durable record. Only the sequencer in `node` calls
// both, in that order, with the journal append in between.

mod apply;
mod plan;

pub use plan::Planned;

use crate::journal::NamespaceImage;
use crate::leases::{HolderId, Lease, LeaseTable};
use crate::namespace::{EntryKind, NamespaceTree, PathEntry};
use crate::prelude::*;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namesystem {
    tree: NamespaceTree,
    leases: LeaseTable,
    last_txid: u64,
    last_timestamp: HlcTimestamp,
}

/// Point-in-time view of one entry as served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatus {
    pub id: InodeId,
    pub path: String,
    pub kind: EntryKind,
    /// Durable length; zero for directories
    pub length: u64,
    pub blocks: usize,
    pub under_construction: bool,
    pub lease_holder: Option<HolderId>,
    pub mtime: HlcTimestamp,
}

impl Namesystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> &NamespaceTree {
        &self.tree
    }

    pub fn leases(&self) -> &LeaseTable {
        &self.leases
    }

    pub fn last_txid(&self) -> u64 {
        self.last_txid
    }

    pub fn last_timestamp(&self) -> HlcTimestamp {
        self.last_timestamp
    }

    pub fn resolve(&self, path: &str) -> Result<InodeId> {
        self.tree.resolve(path)
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.tree.lookup(path)?.is_some())
    }

    pub fn status_of(&self, id: InodeId) -> Option<FileStatus> {
        let entry = self.tree.get(id)?;
        Some(self.status(entry))
    }

    pub fn stat(&self, path: &str) -> Result<FileStatus> {
        let id = self.tree.resolve(path)?;
        self.status_of(id).ok_or_else(|| Error::PathNotFound {
            path: path.to_string(),
        })
    }

    /// Children of a directory, or the file itself.
    pub fn list(&self, path: &str) -> Result<Vec<FileStatus>> {
        let id = self.tree.resolve(path)?;
        Ok(self
            .tree
            .list(id)?
            .into_iter()
            .map(|entry| self.status(entry))
            .collect())
    }

    pub fn lease(&self, file: InodeId) -> Option<&Lease> {
        self.leases.get(file)
    }

    pub fn leases_of(&self, holder: &HolderId) -> Vec<Lease> {
        self.leases.leases_of(holder).into_iter().cloned().collect()
    }

    /// Current path of a leased file; follows any rename since the lease
    /// was granted.
    pub fn path_of(&self, id: InodeId) -> Option<String> {
        self.tree.path_of(id)
    }

    fn status(&self, entry: &PathEntry) -> FileStatus {
        let file = entry.file();
        FileStatus {
            id: entry.id,
            path: self.tree.path_of(entry.id).unwrap_or_default(),
            kind: entry.kind(),
            length: file.map_or(0, |f| f.length),
            blocks: file.map_or(0, |f| f.blocks.len()),
            under_construction: file.is_some_and(|f| f.under_construction),
            lease_holder: self.leases.holder_of(entry.id).cloned(),
            mtime: entry.mtime,
        }
    }

    pub fn image(&self) -> NamespaceImage {
        NamespaceImage {
            last_txid: self.last_txid,
            last_timestamp: self.last_timestamp,
            next_inode: self.tree.next_id(),
            entries: self.tree.entries().cloned().collect(),
            leases: self.leases.iter().cloned().collect(),
        }
    }

    pub fn from_image(image: NamespaceImage) -> Result<Self> {
        let tree = NamespaceTree::from_entries(image.entries, image.next_inode)?;
        for lease in &image.leases {
            if !tree.get(lease.file).is_some_and(PathEntry::is_file) {
                return Err(Error::CorruptImage {
                    reason: format!("lease of {} on missing file {}", lease.holder, lease.file),
                });
            }
        }
        Ok(Self {
            tree,
            leases: LeaseTable::from_leases(image.leases),
            last_txid: image.last_txid,
            last_timestamp: image.last_timestamp,
        })
    }
}
