// Request validation. Nothing here mutates state: each plan returns the
// journal ops that carry the request out, plus the value to hand back once
// they are durable and applied.

use super::Namesystem;
use crate::journal::Op;
use crate::leases::{HolderId, Lease};
use crate::namespace::{path, EntryKind, FileState};
use crate::prelude::*;
use crate::rename;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Planned<T> {
    pub ops: Vec<Op>,
    pub value: T,
}

impl<T> Planned<T> {
    fn new(ops: Vec<Op>, value: T) -> Self {
        Self { ops, value }
    }

    fn nothing(value: T) -> Self {
        Self::new(Vec::new(), value)
    }

    pub fn into_parts(self) -> (Vec<Op>, T) {
        (self.ops, self.value)
    }
}

impl Namesystem {
    /// Ops creating every missing directory along `segments`. Returns the
    /// ops, the id the last segment ends up with, and the next free id.
    fn plan_dirs(&self, segments: &[&str]) -> Result<(Vec<Op>, InodeId, InodeId)> {
        let (mut current, depth) = self.tree.closest_ancestor(segments)?;
        let mut next = self.tree.next_id();
        let mut ops = Vec::new();
        for name in &segments[depth..] {
            path::validate_name(name)?;
            ops.push(Op::CreatePath {
                id: next,
                parent: current,
                name: name.to_string(),
                kind: EntryKind::Directory,
            });
            current = next;
            next = next.next();
        }
        Ok((ops, current, next))
    }

    /// `mkdir -p`: creates whatever is missing along `path`.
    pub fn plan_mkdirs(&self, path: &str) -> Result<Planned<InodeId>> {
        let segments = path::split(path)?;
        let (ops, id, _) = self.plan_dirs(&segments)?;
        Ok(Planned::new(ops, id))
    }

    /// Creates a file open for writing by `holder`, along with any missing
    /// parent directories. With `overwrite`, an existing file that nobody
    /// else is writing is replaced by a new one with a fresh id.
    pub fn plan_create(
        &self,
        holder: &HolderId,
        path: &str,
        overwrite: bool,
    ) -> Result<Planned<InodeId>> {
        let (parents, leaf) = path::split_parent(path)?;
        path::validate_name(leaf)?;
        let (mut ops, parent, id) = self.plan_dirs(&parents)?;

        if let Some(existing) = self.tree.child(parent, leaf) {
            let entry = self.tree.get(existing).ok_or_else(|| Error::PathNotFound {
                path: path.to_string(),
            })?;
            if entry.is_dir() || !overwrite {
                return Err(Error::AlreadyExists {
                    path: path.to_string(),
                });
            }
            self.leases.check_acquire(holder, existing)?;
            ops.push(Op::Delete { id: existing });
        }

        ops.push(Op::CreatePath {
            id,
            parent,
            name: leaf.to_string(),
            kind: EntryKind::File,
        });
        ops.push(Op::AddLease {
            holder: holder.clone(),
            file: id,
        });
        Ok(Planned::new(ops, id))
    }

    /// Reopens an existing file for writing.
    pub fn plan_append(&self, holder: &HolderId, path: &str) -> Result<Planned<InodeId>> {
        let id = self.tree.resolve(path)?;
        if !self.tree.get(id).is_some_and(|e| e.is_file()) {
            return Err(Error::NotAFile {
                path: path.to_string(),
            });
        }
        self.leases.check_acquire(holder, id)?;
        Ok(Planned::new(
            vec![Op::AddLease {
                holder: holder.clone(),
                file: id,
            }],
            id,
        ))
    }

    pub fn plan_rename(&self, src: &str, dst: &str) -> Result<Planned<()>> {
        let ops = match rename::plan_rename(&self.tree, src, dst)? {
            Some(plan) => vec![Op::Rename {
                id: plan.id,
                new_parent: plan.new_parent,
                new_name: plan.new_name,
            }],
            None => Vec::new(),
        };
        Ok(Planned::new(ops, ()))
    }

    /// Removes `path` and everything below it. Refused while any file in the
    /// subtree is open for writing.
    pub fn plan_delete(&self, path: &str) -> Result<Planned<()>> {
        if path::split(path)?.is_empty() {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                reason: "the root cannot be deleted",
            });
        }
        let id = self.tree.resolve(path)?;
        let open_files = self
            .tree
            .files_under(id)
            .into_iter()
            .filter(|file| self.leases.get(*file).is_some())
            .count();
        if open_files > 0 {
            return Err(Error::Busy {
                path: path.to_string(),
                open_files,
            });
        }
        Ok(Planned::new(vec![Op::Delete { id }], ()))
    }

    /// Records `length` bytes of `file` as durable and renews the lease.
    pub fn plan_sync(&self, holder: &HolderId, file: InodeId, length: u64) -> Result<Planned<()>> {
        self.leased_file(holder, file)?;
        Ok(Planned::new(vec![Op::SyncFile { file, length }], ()))
    }

    /// Finalizes `file` at `length` and drops the writer's lease.
    pub fn plan_close(&self, holder: &HolderId, file: InodeId, length: u64) -> Result<Planned<()>> {
        self.leased_file(holder, file)?;
        Ok(Planned::new(vec![Op::CloseFile { file, length }], ()))
    }

    pub fn plan_renew(&self, holder: &HolderId, file: InodeId) -> Result<Planned<()>> {
        self.leases.check_renew(holder, file)?;
        Ok(Planned::new(
            vec![Op::RenewLease {
                holder: holder.clone(),
                file,
            }],
            (),
        ))
    }

    /// Heartbeat: renews every lease `holder` has. Returns how many.
    pub fn plan_renew_holder(&self, holder: &HolderId) -> Planned<usize> {
        match self.leases.leases_of(holder).len() {
            0 => Planned::nothing(0),
            n => Planned::new(
                vec![Op::RenewHolder {
                    holder: holder.clone(),
                }],
                n,
            ),
        }
    }

    /// Gives up a lease without changing the file's length. Returns false if
    /// there was nothing to release.
    pub fn plan_release(&self, holder: &HolderId, file: InodeId) -> Result<Planned<bool>> {
        if self.leases.check_release(holder, file)? {
            Ok(Planned::new(vec![Op::RemoveLease { file }], true))
        } else {
            Ok(Planned::nothing(false))
        }
    }

    /// Checks that `holder` may add a block to `file`. The block itself comes
    /// from the storage layer before an `AddBlock` op is journaled.
    pub fn check_add_block(&self, holder: &HolderId, file: InodeId) -> Result<()> {
        self.leased_file(holder, file).map(|_| ())
    }

    /// Reclaims every lease not renewed within `timeout` as of `now`.
    pub fn plan_expire(&self, now: HlcTimestamp, timeout: Duration) -> Planned<Vec<Lease>> {
        let expired: Vec<Lease> = self
            .leases
            .expired(now, timeout)
            .into_iter()
            .cloned()
            .collect();
        let ops = expired
            .iter()
            .map(|lease| Op::RemoveLease { file: lease.file })
            .collect();
        Planned::new(ops, expired)
    }

    fn leased_file(&self, holder: &HolderId, file: InodeId) -> Result<&FileState> {
        let entry = self.tree.get(file).ok_or_else(|| Error::PathNotFound {
            path: format!("inode {file}"),
        })?;
        let state = entry.file().ok_or_else(|| Error::NotAFile {
            path: self.tree.path_of(file).unwrap_or_default(),
        })?;
        self.leases.check_renew(holder, file)?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::replay;
    use super::*;

    fn run<T>(planned: Result<Planned<T>>, ns: &mut Namesystem) -> T {
        let (ops, value) = planned.unwrap().into_parts();
        replay(ns, ops);
        value
    }

    #[test]
    fn test_create_makes_parents() {
        let mut ns = Namesystem::new();
        let w = HolderId::from("w");

        let plan = ns.plan_create(&w, "/user/a+b/dir1/file1", false).unwrap();
        // three directories, the file, the lease
        assert_eq!(plan.ops.len(), 5);
        let file = run(Ok(plan), &mut ns);

        assert_eq!(ns.resolve("/user/a+b/dir1/file1").unwrap(), file);
        assert_eq!(ns.lease(file).unwrap().holder, w);
        assert!(ns.stat("/user/a+b/dir1").unwrap().kind == EntryKind::Directory);
    }

    #[test]
    fn test_create_existing() {
        let mut ns = Namesystem::new();
        let w = HolderId::from("w");
        let r = HolderId::from("r");
        let old = run(ns.plan_create(&w, "/f", false), &mut ns);

        assert!(matches!(
            ns.plan_create(&w, "/f", false),
            Err(Error::AlreadyExists { .. })
        ));
        assert!(matches!(
            ns.plan_create(&r, "/f", true),
            Err(Error::Conflict { .. })
        ));

        let new = run(ns.plan_create(&w, "/f", true), &mut ns);
        assert_ne!(old, new);
        assert!(ns.lease(old).is_none());
        assert_eq!(ns.resolve("/f").unwrap(), new);
    }

    #[test]
    fn test_create_invalid_leaf_plans_nothing() {
        let ns = Namesystem::new();
        assert!(matches!(
            ns.plan_create(&"w".into(), "/user/$ ", false),
            Err(Error::InvalidName { .. })
        ));
        assert!(matches!(
            ns.plan_mkdirs("/ok/bad:name/x"),
            Err(Error::InvalidName { .. })
        ));
    }

    #[test]
    fn test_mkdirs_existing_is_empty() {
        let mut ns = Namesystem::new();
        let id = run(ns.plan_mkdirs("/a/b"), &mut ns);
        let again = ns.plan_mkdirs("/a/b").unwrap();
        assert!(again.ops.is_empty());
        assert_eq!(again.value, id);
    }

    #[test]
    fn test_delete_busy() {
        let mut ns = Namesystem::new();
        let w = HolderId::from("w");
        let file = run(ns.plan_create(&w, "/d/f", false), &mut ns);

        match ns.plan_delete("/d") {
            Err(Error::Busy { open_files, .. }) => assert_eq!(open_files, 1),
            other => panic!("expected busy, got {other:?}"),
        }
        assert!(matches!(ns.plan_delete("/"), Err(Error::InvalidPath { .. })));

        run(ns.plan_close(&w, file, 10), &mut ns);
        run(ns.plan_delete("/d"), &mut ns);
        assert!(!ns.exists("/d").unwrap());
    }

    #[test]
    fn test_lease_checks() {
        let mut ns = Namesystem::new();
        let w = HolderId::from("w");
        let r = HolderId::from("r");
        let file = run(ns.plan_create(&w, "/f", false), &mut ns);

        assert!(matches!(ns.plan_append(&r, "/f"), Err(Error::Conflict { .. })));
        assert!(matches!(ns.plan_sync(&r, file, 5), Err(Error::NotHolder { .. })));
        assert!(matches!(ns.plan_close(&r, file, 5), Err(Error::NotHolder { .. })));
        assert!(matches!(ns.plan_release(&r, file), Err(Error::NotHolder { .. })));
        assert!(matches!(
            ns.plan_sync(&w, InodeId(99), 5),
            Err(Error::PathNotFound { .. })
        ));
        assert!(matches!(ns.plan_append(&w, "/"), Err(Error::NotAFile { .. })));

        assert!(run(ns.plan_release(&w, file), &mut ns));
        assert!(!run(ns.plan_release(&w, file), &mut ns));
        assert_eq!(ns.plan_renew_holder(&w).value, 0);

        // reopen by a different writer now that it is free
        assert_eq!(run(ns.plan_append(&r, "/f"), &mut ns), file);
    }

    #[test]
    fn test_expire() {
        let mut ns = Namesystem::new();
        let w = HolderId::from("w");
        let file = run(ns.plan_create(&w, "/f", false), &mut ns);
        run(ns.plan_sync(&w, file, 42), &mut ns);

        let granted = ns.lease(file).unwrap().last_renewed;
        let later = HlcTimestamp::new(granted.physical + 61_000, 0);
        let planned = ns.plan_expire(later, Duration::from_secs(60));
        assert_eq!(planned.value.len(), 1);
        run(Ok(planned), &mut ns);

        let status = ns.stat("/f").unwrap();
        assert_eq!(status.length, 42);
        assert!(!status.under_construction);
        assert!(ns.leases().is_empty());
    }
}
