// Hierarchical namespace of directories and files
//
// - entries addressed by stable inode ids (arena + index)
// - paths resolved fresh on every call
// - leaf names validated on every create and rename

pub mod inode;
pub mod path;
pub mod tree;

pub use inode::{EntryData, EntryKind, FileState, InodeId, PathEntry};
pub use tree::NamespaceTree;
