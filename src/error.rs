use crate::{leases::HolderId, namespace::InodeId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    #[error("Not a directory: {path}")]
    NotADirectory { path: String },

    #[error("Not a file: {path}")]
    NotAFile { path: String },

    #[error("Path already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Rename destination already exists: {path}")]
    DestinationExists { path: String },

    #[error("Rename source not found: {path}")]
    SourceNotFound { path: String },

    #[error("Invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Cannot rename {src} to {dst}: {reason}")]
    InvalidRename {
        src: String,
        dst: String,
        reason: &'static str,
    },

    #[error("Parent inode {parent} does not exist")]
    ParentMissing { parent: InodeId },

    #[error("Lease conflict: inode {file} is held by {holder}")]
    Conflict { file: InodeId, holder: HolderId },

    #[error("{holder} does not hold the lease on inode {file}")]
    NotHolder { file: InodeId, holder: HolderId },

    #[error("{path} has {open_files} file(s) open for writing")]
    Busy { path: String, open_files: usize },

    #[error("Journal write failed: {0}")]
    JournalWriteFailure(#[source] std::io::Error),

    #[error("Corrupt journal: {reason}")]
    CorruptJournal { reason: String },

    #[error("Corrupt checkpoint image: {reason}")]
    CorruptImage { reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Namespace service is shutting down")]
    ShuttingDown,

    #[error("Namespace sequencer halted: {reason}")]
    SequencerHalted { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors that make it unsafe to start serving from the persisted state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::CorruptJournal { .. } | Error::CorruptImage { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
