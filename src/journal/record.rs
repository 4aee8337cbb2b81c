use crate::blocks::BlockHandle;
use crate::leases::HolderId;
use crate::namespace::EntryKind;
use crate::prelude::*;

/// On-disk format version for both journal frames and images.
pub const JOURNAL_VERSION: u16 = 1;

/// One durable namespace mutation. `txid` is strictly increasing across the
/// journal; `timestamp` is the clock reading the sequencer stamped it with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub txid: u64,
    pub timestamp: HlcTimestamp,
    pub op: Op,
}

/// Journaled operations. Every variant carries the final values it sets, so
/// applying a record twice leaves the same state as applying it once.
///
/// Variants are encoded by position: new kinds go at the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    CreatePath {
        id: InodeId,
        parent: InodeId,
        name: String,
        kind: EntryKind,
    },
    Rename {
        id: InodeId,
        new_parent: InodeId,
        new_name: String,
    },
    AddLease {
        holder: HolderId,
        file: InodeId,
    },
    RenewLease {
        holder: HolderId,
        file: InodeId,
    },
    /// Drops the lease and finalizes the file at its durable length
    RemoveLease {
        file: InodeId,
    },
    Delete {
        id: InodeId,
    },
    SyncFile {
        file: InodeId,
        length: u64,
    },
    CloseFile {
        file: InodeId,
        length: u64,
    },
    AddBlock {
        file: InodeId,
        block: BlockHandle,
    },
    RenewHolder {
        holder: HolderId,
    },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::CreatePath { .. } => "create_path",
            Op::Rename { .. } => "rename",
            Op::AddLease { .. } => "add_lease",
            Op::RenewLease { .. } => "renew_lease",
            Op::RemoveLease { .. } => "remove_lease",
            Op::Delete { .. } => "delete",
            Op::SyncFile { .. } => "sync_file",
            Op::CloseFile { .. } => "close_file",
            Op::AddBlock { .. } => "add_block",
            Op::RenewHolder { .. } => "renew_holder",
        }
    }
}

impl JournalRecord {
    pub fn new(txid: u64, timestamp: HlcTimestamp, op: Op) -> Self {
        Self { txid, timestamp, op }
    }
}
