//! Lease-aware namespace engine.
//!
//! Keeps the directory tree of a distributed filesystem together with the
//! write leases on its open files. Leases are keyed by inode id, so renaming
//! a file or any of its ancestors never disturbs a writer, and every change
//! goes through a write-ahead journal so open files, their holders and their
//! durable lengths survive a restart.

pub mod prelude;

pub mod blocks;
pub mod config;
pub mod error;
pub mod hlc;
pub mod journal;
pub mod leases;
pub mod namespace;
pub mod namesystem;
pub mod node;
pub mod recovery;
pub mod rename;

mod cli;
pub use cli::{Cli, Commands};

pub use blocks::{BlockHandle, BlockStore, InMemoryBlockStore};
pub use config::NameNodeConfig;
pub use error::{Error, Result};
pub use journal::{FileJournal, InMemoryJournal, Journal};
pub use leases::{HolderId, Lease};
pub use namespace::{EntryKind, InodeId};
pub use namesystem::{FileStatus, Namesystem};
pub use node::{NameNode, NameNodeHandle};
pub use recovery::RecoveryReport;
