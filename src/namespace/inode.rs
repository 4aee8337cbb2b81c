use crate::blocks::BlockHandle;
use crate::prelude::*;

/// Stable identity of a namespace entry. Assigned once at creation and never
/// reused; paths are derived from it, never the other way round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InodeId(pub u64);

impl InodeId {
    pub const ROOT: InodeId = InodeId(0);

    pub fn next(self) -> InodeId {
        InodeId(self.0 + 1)
    }
}

impl std::fmt::Display for InodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Directory,
    File,
}

/// What the namespace knows about a file's contents: how much of it is
/// durable and which blocks hold it. The bytes themselves live in the
/// storage layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    /// Length made durable by the last sync or close
    pub length: u64,
    pub blocks: Vec<BlockHandle>,
    /// True while a writer holds (or held, until recovery) a lease
    pub under_construction: bool,
}

impl FileState {
    /// Length of the final block, as reported to the storage layer when the
    /// file is finalized.
    pub fn last_block_length(&self, block_size: u64) -> u64 {
        match self.blocks.len() {
            0 => 0,
            n => self.length.saturating_sub(block_size * (n as u64 - 1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryData {
    Directory { children: BTreeMap<String, InodeId> },
    File(FileState),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    pub id: InodeId,
    pub parent: Option<InodeId>,
    pub name: String,
    /// Timestamp of the journal record that last touched this entry
    pub mtime: HlcTimestamp,
    pub data: EntryData,
}

impl PathEntry {
    pub fn root() -> Self {
        Self {
            id: InodeId::ROOT,
            parent: None,
            name: String::new(),
            mtime: HlcTimestamp::zero(),
            data: EntryData::Directory {
                children: BTreeMap::new(),
            },
        }
    }

    pub fn new(
        id: InodeId,
        parent: InodeId,
        name: String,
        kind: EntryKind,
        mtime: HlcTimestamp,
    ) -> Self {
        let data = match kind {
            EntryKind::Directory => EntryData::Directory {
                children: BTreeMap::new(),
            },
            EntryKind::File => EntryData::File(FileState::default()),
        };
        Self {
            id,
            parent: Some(parent),
            name,
            mtime,
            data,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self.data {
            EntryData::Directory { .. } => EntryKind::Directory,
            EntryData::File(_) => EntryKind::File,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind() == EntryKind::File
    }

    pub fn children(&self) -> Option<&BTreeMap<String, InodeId>> {
        match &self.data {
            EntryData::Directory { children } => Some(children),
            EntryData::File(_) => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut BTreeMap<String, InodeId>> {
        match &mut self.data {
            EntryData::Directory { children } => Some(children),
            EntryData::File(_) => None,
        }
    }

    pub fn file(&self) -> Option<&FileState> {
        match &self.data {
            EntryData::File(state) => Some(state),
            EntryData::Directory { .. } => None,
        }
    }

    pub(crate) fn file_mut(&mut self) -> Option<&mut FileState> {
        match &mut self.data {
            EntryData::File(state) => Some(state),
            EntryData::Directory { .. } => None,
        }
    }
}
