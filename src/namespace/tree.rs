// Arena of namespace entries keyed by inode id.
//
// Public methods validate; the `pub(crate)` mutators are the apply side used
// by the namesystem when replaying journal records and must stay idempotent.

use super::inode::{EntryKind, FileState, PathEntry};
use super::path;
use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceTree {
    entries: BTreeMap<InodeId, PathEntry>,
    next_id: InodeId,
}

impl NamespaceTree {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(InodeId::ROOT, PathEntry::root());
        Self {
            entries,
            next_id: InodeId::ROOT.next(),
        }
    }

    /// Rebuilds a tree from checkpointed entries, checking that parent and
    /// child links agree and that every entry hangs off the root.
    pub fn from_entries(list: Vec<PathEntry>, next_id: InodeId) -> Result<Self> {
        let corrupt = |reason: String| Error::CorruptImage { reason };

        let mut entries = BTreeMap::new();
        for entry in list {
            if entry.id >= next_id {
                return Err(corrupt(format!(
                    "inode {} is not below the next id {}",
                    entry.id, next_id
                )));
            }
            if entries.insert(entry.id, entry).is_some() {
                return Err(corrupt("duplicate inode id".to_string()));
            }
        }

        match entries.get(&InodeId::ROOT) {
            Some(root) if root.is_dir() && root.parent.is_none() => {}
            _ => return Err(corrupt("missing root directory".to_string())),
        }

        for entry in entries.values() {
            let Some(parent_id) = entry.parent else {
                if entry.id != InodeId::ROOT {
                    return Err(corrupt(format!("inode {} has no parent", entry.id)));
                }
                continue;
            };
            let linked = entries
                .get(&parent_id)
                .and_then(|p| p.children())
                .and_then(|children| children.get(&entry.name))
                .is_some_and(|child| *child == entry.id);
            if !linked {
                return Err(corrupt(format!(
                    "inode {} is not listed by its parent {}",
                    entry.id, parent_id
                )));
            }
        }

        let tree = Self { entries, next_id };
        let reachable = tree.subtree(InodeId::ROOT).len();
        if reachable != tree.entries.len() {
            return Err(corrupt(format!(
                "{} inode(s) unreachable from the root",
                tree.entries.len() - reachable
            )));
        }
        Ok(tree)
    }

    pub fn entries(&self) -> impl Iterator<Item = &PathEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 1
    }

    pub fn get(&self, id: InodeId) -> Option<&PathEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: InodeId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Id the next created entry will receive.
    pub fn next_id(&self) -> InodeId {
        self.next_id
    }

    pub fn child(&self, parent: InodeId, name: &str) -> Option<InodeId> {
        self.entries
            .get(&parent)
            .and_then(PathEntry::children)
            .and_then(|children| children.get(name))
            .copied()
    }

    pub fn resolve(&self, path: &str) -> Result<InodeId> {
        let segments = path::split(path)?;
        self.resolve_segments(&segments)
    }

    pub fn resolve_segments(&self, segments: &[&str]) -> Result<InodeId> {
        let mut current = InodeId::ROOT;
        for (depth, segment) in segments.iter().enumerate() {
            let entry = &self.entries[&current];
            let Some(children) = entry.children() else {
                return Err(Error::NotADirectory {
                    path: path::render(&segments[..depth]),
                });
            };
            current = match children.get(*segment) {
                Some(id) => *id,
                None => {
                    return Err(Error::PathNotFound {
                        path: path::render(&segments[..=depth]),
                    })
                }
            };
        }
        Ok(current)
    }

    /// Like [`NamespaceTree::resolve`], but a missing path is `Ok(None)`.
    pub fn lookup(&self, path: &str) -> Result<Option<InodeId>> {
        match self.resolve(path) {
            Ok(id) => Ok(Some(id)),
            Err(Error::PathNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Walks `segments` as far as they exist. Returns the deepest existing
    /// directory and how many segments it consumed. Hitting a file before the
    /// walk ends is `NotADirectory`.
    pub fn closest_ancestor(&self, segments: &[&str]) -> Result<(InodeId, usize)> {
        let mut current = InodeId::ROOT;
        for (depth, segment) in segments.iter().enumerate() {
            match self.child(current, segment) {
                Some(next) if self.entries[&next].is_dir() => current = next,
                Some(_) => {
                    return Err(Error::NotADirectory {
                        path: path::render(&segments[..=depth]),
                    })
                }
                None => return Ok((current, depth)),
            }
        }
        Ok((current, segments.len()))
    }

    /// Absolute path of an entry, rebuilt from the parent chain.
    pub fn path_of(&self, id: InodeId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = self.entries.get(&id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.entries.get(&parent)?;
        }
        names.reverse();
        Some(path::render(&names))
    }

    /// True when `ancestor` is `id` itself or lies on its parent chain.
    pub fn is_ancestor(&self, ancestor: InodeId, id: InodeId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            current = self.entries.get(&cur).and_then(|e| e.parent);
        }
        false
    }

    /// `id` and all of its descendants, parents before children.
    pub fn subtree(&self, id: InodeId) -> Vec<InodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let Some(entry) = self.entries.get(&cur) else {
                continue;
            };
            out.push(cur);
            if let Some(children) = entry.children() {
                stack.extend(children.values().rev());
            }
        }
        out
    }

    pub fn files_under(&self, id: InodeId) -> Vec<InodeId> {
        self.subtree(id)
            .into_iter()
            .filter(|id| self.entries[id].is_file())
            .collect()
    }

    pub fn list(&self, id: InodeId) -> Result<Vec<&PathEntry>> {
        let entry = self.entries.get(&id).ok_or_else(|| Error::PathNotFound {
            path: format!("inode {id}"),
        })?;
        match entry.children() {
            Some(children) => Ok(children.values().map(|c| &self.entries[c]).collect()),
            None => Ok(vec![entry]),
        }
    }

    /// Validates creating `name` under `parent` without changing anything.
    pub fn check_create(&self, parent: InodeId, name: &str) -> Result<()> {
        path::validate_name(name)?;
        let entry = self
            .entries
            .get(&parent)
            .ok_or(Error::ParentMissing { parent })?;
        let children = entry.children().ok_or_else(|| Error::NotADirectory {
            path: self.display_path(parent),
        })?;
        if children.contains_key(name) {
            return Err(Error::AlreadyExists {
                path: path::join(&self.display_path(parent), name),
            });
        }
        Ok(())
    }

    /// Creates a new entry with the next free id.
    pub fn create(
        &mut self,
        parent: InodeId,
        name: &str,
        kind: EntryKind,
        mtime: HlcTimestamp,
    ) -> Result<InodeId> {
        self.check_create(parent, name)?;
        let id = self.next_id;
        self.insert(id, parent, name, kind, mtime)?;
        Ok(id)
    }

    /// Inserts an entry with a known id. An id that already exists was
    /// created by an earlier application of the same record, so this is a
    /// no-op even if the entry has since moved.
    pub(crate) fn insert(
        &mut self,
        id: InodeId,
        parent: InodeId,
        name: &str,
        kind: EntryKind,
        mtime: HlcTimestamp,
    ) -> Result<()> {
        if self.entries.contains_key(&id) {
            return Ok(());
        }

        let parent_entry = self
            .entries
            .get_mut(&parent)
            .ok_or(Error::ParentMissing { parent })?;
        parent_entry.mtime = parent_entry.mtime.max(mtime);
        let Some(children) = parent_entry.children_mut() else {
            return Err(Error::NotADirectory {
                path: format!("inode {parent}"),
            });
        };
        if children.contains_key(name) {
            return Err(Error::AlreadyExists {
                path: name.to_string(),
            });
        }
        children.insert(name.to_string(), id);

        self.entries
            .insert(id, PathEntry::new(id, parent, name.to_string(), kind, mtime));
        if id >= self.next_id {
            self.next_id = id.next();
        }
        Ok(())
    }

    /// Re-parents and/or renames an entry. Ids are untouched.
    pub(crate) fn move_entry(
        &mut self,
        id: InodeId,
        new_parent: InodeId,
        new_name: &str,
        mtime: HlcTimestamp,
    ) -> Result<()> {
        let (old_parent, old_name) = match self.entries.get(&id) {
            Some(entry) => match entry.parent {
                Some(parent) => (parent, entry.name.clone()),
                None => {
                    return Err(Error::InvalidRename {
                        src: "/".to_string(),
                        dst: new_name.to_string(),
                        reason: "the root cannot be moved",
                    })
                }
            },
            None => {
                return Err(Error::SourceNotFound {
                    path: format!("inode {id}"),
                })
            }
        };
        if old_parent == new_parent && old_name == new_name {
            return Ok(());
        }
        if self.is_ancestor(id, new_parent) {
            return Err(Error::InvalidRename {
                src: format!("inode {id}"),
                dst: format!("inode {new_parent}"),
                reason: "destination is inside the source",
            });
        }

        match self.entries.get(&new_parent).and_then(PathEntry::children) {
            Some(children) if children.contains_key(new_name) => {
                return Err(Error::DestinationExists {
                    path: new_name.to_string(),
                })
            }
            Some(_) => {}
            None => return Err(Error::ParentMissing { parent: new_parent }),
        }

        if let Some(old) = self.entries.get_mut(&old_parent) {
            old.mtime = old.mtime.max(mtime);
            if let Some(children) = old.children_mut() {
                if children.get(&old_name) == Some(&id) {
                    children.remove(&old_name);
                }
            }
        }
        if let Some(new) = self.entries.get_mut(&new_parent) {
            new.mtime = new.mtime.max(mtime);
            if let Some(children) = new.children_mut() {
                children.insert(new_name.to_string(), id);
            }
        }
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.parent = Some(new_parent);
            entry.name = new_name.to_string();
            entry.mtime = entry.mtime.max(mtime);
        }
        Ok(())
    }

    /// Detaches and drops `id` with everything below it. Unknown ids remove
    /// nothing.
    pub(crate) fn remove_subtree(&mut self, id: InodeId, mtime: HlcTimestamp) -> Vec<PathEntry> {
        if id == InodeId::ROOT {
            return Vec::new();
        }
        let doomed = self.subtree(id);
        if let Some(entry) = self.entries.get(&id) {
            let (parent, name) = (entry.parent, entry.name.clone());
            if let Some(parent) = parent.and_then(|p| self.entries.get_mut(&p)) {
                parent.mtime = parent.mtime.max(mtime);
                if let Some(children) = parent.children_mut() {
                    children.remove(&name);
                }
            }
        }
        doomed
            .into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .collect()
    }

    pub(crate) fn file_mut(&mut self, id: InodeId) -> Option<&mut FileState> {
        self.entries.get_mut(&id).and_then(PathEntry::file_mut)
    }

    pub(crate) fn touch(&mut self, id: InodeId, mtime: HlcTimestamp) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.mtime = entry.mtime.max(mtime);
        }
    }

    fn display_path(&self, id: InodeId) -> String {
        self.path_of(id).unwrap_or_else(|| format!("inode {id}"))
    }
}

impl Default for NamespaceTree {
    fn default() -> Self {
        Self::new()
    }
}
