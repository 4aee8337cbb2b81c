// Lease table: which holder writes which file, indexed both ways

use super::{HolderId, Lease};
use crate::prelude::*;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaseTable {
    /// At most one lease per file
    by_file: BTreeMap<InodeId, Lease>,
    /// Files each holder has open for writing
    by_holder: BTreeMap<HolderId, BTreeSet<InodeId>>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_leases(leases: impl IntoIterator<Item = Lease>) -> Self {
        let mut table = Self::new();
        for lease in leases {
            table.insert(lease);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.by_file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_file.is_empty()
    }

    pub fn get(&self, file: InodeId) -> Option<&Lease> {
        self.by_file.get(&file)
    }

    pub fn holder_of(&self, file: InodeId) -> Option<&HolderId> {
        self.by_file.get(&file).map(|lease| &lease.holder)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lease> {
        self.by_file.values()
    }

    pub fn leases_of(&self, holder: &HolderId) -> Vec<&Lease> {
        self.by_holder
            .get(holder)
            .map(|files| files.iter().filter_map(|f| self.by_file.get(f)).collect())
            .unwrap_or_default()
    }

    /// Fails with `Conflict` if a different holder owns `file`.
    pub fn check_acquire(&self, holder: &HolderId, file: InodeId) -> Result<()> {
        match self.by_file.get(&file) {
            Some(existing) if existing.holder != *holder => Err(Error::Conflict {
                file,
                holder: existing.holder.clone(),
            }),
            _ => Ok(()),
        }
    }

    pub fn check_renew(&self, holder: &HolderId, file: InodeId) -> Result<()> {
        match self.by_file.get(&file) {
            Some(lease) if lease.holder == *holder => Ok(()),
            _ => Err(Error::NotHolder {
                file,
                holder: holder.clone(),
            }),
        }
    }

    pub fn renew(&mut self, holder: &HolderId, file: InodeId, at: HlcTimestamp) -> Result<()> {
        self.check_renew(holder, file)?;
        if let Some(lease) = self.by_file.get_mut(&file) {
            lease.renew(at);
        }
        Ok(())
    }

    /// Renews every lease of `holder`; returns how many were renewed.
    pub fn renew_holder(&mut self, holder: &HolderId, at: HlcTimestamp) -> usize {
        let Some(files) = self.by_holder.get(holder) else {
            return 0;
        };
        let mut renewed = 0;
        for file in files {
            if let Some(lease) = self.by_file.get_mut(file) {
                lease.renew(at);
                renewed += 1;
            }
        }
        renewed
    }

    /// Whether `holder` releasing `file` removes anything. Releasing a lease
    /// nobody holds is a no-op; releasing another holder's lease is
    /// `NotHolder`.
    pub fn check_release(&self, holder: &HolderId, file: InodeId) -> Result<bool> {
        match self.by_file.get(&file) {
            None => Ok(false),
            Some(lease) if lease.holder != *holder => Err(Error::NotHolder {
                file,
                holder: holder.clone(),
            }),
            Some(_) => Ok(true),
        }
    }

    /// Removes whatever lease `file` has, regardless of holder.
    pub fn force_release(&mut self, file: InodeId) -> Option<Lease> {
        let lease = self.by_file.remove(&file)?;
        if let Some(files) = self.by_holder.get_mut(&lease.holder) {
            files.remove(&file);
            if files.is_empty() {
                self.by_holder.remove(&lease.holder);
            }
        }
        Some(lease)
    }

    /// Leases whose holder has not renewed within `timeout`, oldest first.
    pub fn expired(&self, now: HlcTimestamp, timeout: Duration) -> Vec<&Lease> {
        let mut expired: Vec<&Lease> = self
            .by_file
            .values()
            .filter(|lease| lease.is_expired(now, timeout))
            .collect();
        expired.sort_by_key(|lease| (lease.last_renewed, lease.file));
        expired
    }

    /// Puts a lease in place as-is, replacing any previous lease on the file.
    pub(crate) fn insert(&mut self, lease: Lease) {
        self.force_release(lease.file);
        self.by_holder
            .entry(lease.holder.clone())
            .or_default()
            .insert(lease.file);
        self.by_file.insert(lease.file, lease);
    }
}
