// Record application. Each op sets final values from its operands, so a
// record applied twice leaves the state it left the first time.

use super::Namesystem;
use crate::journal::{JournalRecord, Op};
use crate::leases::Lease;
use crate::namespace::FileState;
use crate::prelude::*;

impl Namesystem {
    pub fn apply(&mut self, record: &JournalRecord) -> Result<()> {
        let at = record.timestamp;
        match &record.op {
            Op::CreatePath {
                id,
                parent,
                name,
                kind,
            } => self.tree.insert(*id, *parent, name, *kind, at)?,
            Op::Rename {
                id,
                new_parent,
                new_name,
            } => self.tree.move_entry(*id, *new_parent, new_name, at)?,
            Op::AddLease { holder, file } => {
                self.file_mut(*file)?.under_construction = true;
                self.leases.insert(Lease::new(holder.clone(), *file, at));
                self.tree.touch(*file, at);
            }
            Op::RenewLease { holder, file } => {
                if self.leases.holder_of(*file) == Some(holder) {
                    self.leases.renew(holder, *file, at)?;
                }
            }
            Op::RemoveLease { file } => {
                self.leases.force_release(*file);
                if let Ok(state) = self.file_mut(*file) {
                    state.under_construction = false;
                }
            }
            Op::Delete { id } => {
                for file in self.tree.files_under(*id) {
                    self.leases.force_release(file);
                }
                self.tree.remove_subtree(*id, at);
            }
            Op::SyncFile { file, length } => {
                self.file_mut(*file)?.length = *length;
                self.tree.touch(*file, at);
                if let Some(lease) = self.leases.get(*file) {
                    let holder = lease.holder.clone();
                    self.leases.renew(&holder, *file, at)?;
                }
            }
            Op::CloseFile { file, length } => {
                let state = self.file_mut(*file)?;
                state.length = *length;
                state.under_construction = false;
                self.tree.touch(*file, at);
                self.leases.force_release(*file);
            }
            Op::AddBlock { file, block } => {
                let state = self.file_mut(*file)?;
                if !state.blocks.contains(block) {
                    state.blocks.push(*block);
                }
            }
            Op::RenewHolder { holder } => {
                self.leases.renew_holder(holder, at);
            }
        }

        self.last_txid = self.last_txid.max(record.txid);
        self.last_timestamp = self.last_timestamp.max(at);
        debug!(txid = record.txid, op = record.op.name(), "applied journal record");
        Ok(())
    }

    fn file_mut(&mut self, id: InodeId) -> Result<&mut FileState> {
        if !self.tree.contains(id) {
            return Err(Error::PathNotFound {
                path: format!("inode {id}"),
            });
        }
        self.tree.file_mut(id).ok_or_else(|| Error::NotAFile {
            path: format!("inode {id}"),
        })
    }
}
