// Namespace node: one sequencer task owns the journal and applies every
// mutation; readers share the namespace behind a read-write lock.

use crate::blocks::{BlockHandle, BlockStore, InMemoryBlockStore};
use crate::config::NameNodeConfig;
use crate::hlc::{PhysicalClock, SystemClock};
use crate::journal::{FileJournal, Journal, JournalRecord, Op};
use crate::leases::{HolderId, Lease, LeaseMonitor};
use crate::namesystem::{FileStatus, Namesystem, Planned};
use crate::prelude::*;
use crate::recovery::{recover, RecoveryReport};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type Reply<T> = oneshot::Sender<Result<T>>;

#[derive(Debug)]
enum Command {
    Mkdirs {
        path: String,
        reply: Reply<InodeId>,
    },
    Create {
        holder: HolderId,
        path: String,
        overwrite: bool,
        reply: Reply<InodeId>,
    },
    Append {
        holder: HolderId,
        path: String,
        reply: Reply<InodeId>,
    },
    Rename {
        src: String,
        dst: String,
        reply: Reply<()>,
    },
    Delete {
        path: String,
        reply: Reply<()>,
    },
    Sync {
        holder: HolderId,
        file: InodeId,
        length: u64,
        reply: Reply<()>,
    },
    Close {
        holder: HolderId,
        file: InodeId,
        length: u64,
        reply: Reply<()>,
    },
    RenewLease {
        holder: HolderId,
        file: InodeId,
        reply: Reply<()>,
    },
    RenewHolder {
        holder: HolderId,
        reply: Reply<usize>,
    },
    Release {
        holder: HolderId,
        file: InodeId,
        reply: Reply<bool>,
    },
    AllocateBlock {
        holder: HolderId,
        file: InodeId,
        reply: Reply<BlockHandle>,
    },
    ExpireLeases {
        reply: Reply<usize>,
    },
    Checkpoint {
        reply: Reply<u64>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Cheap, cloneable access to a running node. Mutations queue behind the
/// sequencer and resolve once durable; reads go straight to the shared state.
#[derive(Debug, Clone)]
pub struct NameNodeHandle {
    commands: mpsc::Sender<Command>,
    state: Arc<RwLock<Namesystem>>,
}

impl NameNodeHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| Error::ShuttingDown)?;
        response.await.map_err(|_| Error::ShuttingDown)?
    }

    pub async fn mkdirs(&self, path: &str) -> Result<InodeId> {
        let path = path.to_string();
        self.request(|reply| Command::Mkdirs { path, reply }).await
    }

    /// Creates `path` open for writing by `holder`. Missing parent
    /// directories are created. Returns the id to write through.
    pub async fn create(&self, holder: &HolderId, path: &str, overwrite: bool) -> Result<InodeId> {
        let (holder, path) = (holder.clone(), path.to_string());
        self.request(|reply| Command::Create {
            holder,
            path,
            overwrite,
            reply,
        })
        .await
    }

    pub async fn append(&self, holder: &HolderId, path: &str) -> Result<InodeId> {
        let (holder, path) = (holder.clone(), path.to_string());
        self.request(|reply| Command::Append {
            holder,
            path,
            reply,
        })
        .await
    }

    pub async fn rename(&self, src: &str, dst: &str) -> Result<()> {
        let (src, dst) = (src.to_string(), dst.to_string());
        self.request(|reply| Command::Rename { src, dst, reply }).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.request(|reply| Command::Delete { path, reply }).await
    }

    /// Makes the first `length` bytes of `file` durable and renews the lease.
    pub async fn sync(&self, holder: &HolderId, file: InodeId, length: u64) -> Result<()> {
        let holder = holder.clone();
        self.request(|reply| Command::Sync {
            holder,
            file,
            length,
            reply,
        })
        .await
    }

    pub async fn close(&self, holder: &HolderId, file: InodeId, length: u64) -> Result<()> {
        let holder = holder.clone();
        self.request(|reply| Command::Close {
            holder,
            file,
            length,
            reply,
        })
        .await
    }

    pub async fn renew_lease(&self, holder: &HolderId, file: InodeId) -> Result<()> {
        let holder = holder.clone();
        self.request(|reply| Command::RenewLease {
            holder,
            file,
            reply,
        })
        .await
    }

    /// Client heartbeat. Returns the number of leases renewed.
    pub async fn renew_holder(&self, holder: &HolderId) -> Result<usize> {
        let holder = holder.clone();
        self.request(|reply| Command::RenewHolder { holder, reply })
            .await
    }

    pub async fn release(&self, holder: &HolderId, file: InodeId) -> Result<bool> {
        let holder = holder.clone();
        self.request(|reply| Command::Release {
            holder,
            file,
            reply,
        })
        .await
    }

    pub async fn allocate_block(&self, holder: &HolderId, file: InodeId) -> Result<BlockHandle> {
        let holder = holder.clone();
        self.request(|reply| Command::AllocateBlock {
            holder,
            file,
            reply,
        })
        .await
    }

    /// Reclaims stale leases now instead of waiting for the monitor.
    pub async fn expire_leases(&self) -> Result<usize> {
        self.request(|reply| Command::ExpireLeases { reply }).await
    }

    /// Writes an image and truncates the journal. Returns the image's txid.
    pub async fn checkpoint(&self) -> Result<u64> {
        self.request(|reply| Command::Checkpoint { reply }).await
    }

    pub fn resolve(&self, path: &str) -> Result<InodeId> {
        self.state.read().resolve(path)
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        self.state.read().exists(path)
    }

    pub fn stat(&self, path: &str) -> Result<FileStatus> {
        self.state.read().stat(path)
    }

    pub fn status_of(&self, id: InodeId) -> Option<FileStatus> {
        self.state.read().status_of(id)
    }

    pub fn list(&self, path: &str) -> Result<Vec<FileStatus>> {
        self.state.read().list(path)
    }

    pub fn path_of(&self, id: InodeId) -> Option<String> {
        self.state.read().path_of(id)
    }

    pub fn lease(&self, file: InodeId) -> Option<Lease> {
        self.state.read().lease(file).cloned()
    }

    pub fn leases_of(&self, holder: &HolderId) -> Vec<Lease> {
        self.state.read().leases_of(holder)
    }

    pub fn all_leases(&self) -> Vec<Lease> {
        self.state.read().leases().iter().cloned().collect()
    }

    pub fn last_txid(&self) -> u64 {
        self.state.read().last_txid()
    }

    /// Copy of the whole namespace as of the last applied record.
    pub fn snapshot(&self) -> Namesystem {
        self.state.read().clone()
    }
}

/// Owns the sequencer and lease monitor tasks of a running node.
#[derive(Debug)]
pub struct NameNode {
    handle: NameNodeHandle,
    sequencer: Option<JoinHandle<()>>,
    monitor: Option<LeaseMonitor>,
    recovery: RecoveryReport,
}

impl NameNode {
    /// Opens the node stored under `config.storage_dir`, with an in-memory
    /// block store and the system clock.
    pub async fn open(config: NameNodeConfig) -> Result<Self> {
        let journal = FileJournal::open(&config.storage_dir).await?;
        Self::start(
            config,
            Box::new(journal),
            Arc::new(InMemoryBlockStore::new()),
            Arc::new(SystemClock),
        )
        .await
    }

    /// Recovers from `journal` and starts serving. Recovery errors are
    /// returned before any task is spawned.
    pub async fn start(
        config: NameNodeConfig,
        mut journal: Box<dyn Journal>,
        block_store: Arc<dyn BlockStore>,
        clock: Arc<dyn PhysicalClock>,
    ) -> Result<Self> {
        config.validate()?;
        let (namesystem, recovery) = recover(&mut *journal).await?;

        let hlc = Hlc::with_source(clock);
        hlc.observe(namesystem.last_timestamp());

        let state = Arc::new(RwLock::new(namesystem));
        let (commands, receiver) = mpsc::channel(config.command_queue);
        let handle = NameNodeHandle { commands, state };

        let sequencer = Sequencer {
            state: handle.state.clone(),
            journal,
            block_store,
            hlc,
            since_checkpoint: recovery.replayed as u64,
            config: config.clone(),
            halted: None,
        };
        let sequencer = tokio::spawn(sequencer.run(receiver));
        let monitor = LeaseMonitor::spawn(handle.clone(), config.monitor_interval());

        info!(
            storage_dir = %config.storage_dir.display(),
            last_txid = recovery.last_txid,
            "namespace node started"
        );
        Ok(Self {
            handle,
            sequencer: Some(sequencer),
            monitor: Some(monitor),
            recovery,
        })
    }

    pub fn handle(&self) -> NameNodeHandle {
        self.handle.clone()
    }

    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Checkpoints and stops. Requests still queued behind the shutdown fail
    /// with `ShuttingDown`.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
        }
        let result = self.handle.request(|reply| Command::Shutdown { reply }).await;
        if let Some(sequencer) = self.sequencer.take() {
            let _ = sequencer.await;
        }
        result
    }

    /// Stops without a checkpoint, as a crash would. Everything acknowledged
    /// so far is already in the journal.
    pub async fn halt(mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
        }
        if let Some(sequencer) = self.sequencer.take() {
            sequencer.abort();
            let _ = sequencer.await;
        }
    }
}

impl std::ops::Deref for NameNode {
    type Target = NameNodeHandle;

    fn deref(&self) -> &NameNodeHandle {
        &self.handle
    }
}

impl Drop for NameNode {
    fn drop(&mut self) {
        if let Some(sequencer) = self.sequencer.take() {
            sequencer.abort();
        }
    }
}

struct Sequencer {
    state: Arc<RwLock<Namesystem>>,
    journal: Box<dyn Journal>,
    block_store: Arc<dyn BlockStore>,
    hlc: Hlc,
    since_checkpoint: u64,
    config: NameNodeConfig,
    /// Set once memory and journal disagree; no mutation or checkpoint runs after
    halted: Option<String>,
}

impl Sequencer {
    async fn run(mut self, mut receiver: mpsc::Receiver<Command>) {
        while let Some(command) = receiver.recv().await {
            match command {
                Command::Mkdirs { path, reply } => {
                    let planned = self.state.read().plan_mkdirs(&path);
                    let _ = reply.send(self.commit(planned).await);
                }
                Command::Create {
                    holder,
                    path,
                    overwrite,
                    reply,
                } => {
                    let planned = self.state.read().plan_create(&holder, &path, overwrite);
                    let _ = reply.send(self.commit(planned).await);
                }
                Command::Append {
                    holder,
                    path,
                    reply,
                } => {
                    let planned = self.state.read().plan_append(&holder, &path);
                    let _ = reply.send(self.commit(planned).await);
                }
                Command::Rename { src, dst, reply } => {
                    let planned = self.state.read().plan_rename(&src, &dst);
                    let _ = reply.send(self.commit(planned).await);
                }
                Command::Delete { path, reply } => {
                    let planned = self.state.read().plan_delete(&path);
                    let _ = reply.send(self.commit(planned).await);
                }
                Command::Sync {
                    holder,
                    file,
                    length,
                    reply,
                } => {
                    let planned = self.state.read().plan_sync(&holder, file, length);
                    let _ = reply.send(self.commit(planned).await);
                }
                Command::Close {
                    holder,
                    file,
                    length,
                    reply,
                } => {
                    let planned = self.state.read().plan_close(&holder, file, length);
                    let _ = reply.send(self.commit(planned).await);
                }
                Command::RenewLease {
                    holder,
                    file,
                    reply,
                } => {
                    let planned = self.state.read().plan_renew(&holder, file);
                    let _ = reply.send(self.commit(planned).await);
                }
                Command::RenewHolder { holder, reply } => {
                    let planned = self.state.read().plan_renew_holder(&holder);
                    let _ = reply.send(self.commit(Ok(planned)).await);
                }
                Command::Release {
                    holder,
                    file,
                    reply,
                } => {
                    let planned = self.state.read().plan_release(&holder, file);
                    let _ = reply.send(self.commit(planned).await);
                }
                Command::AllocateBlock {
                    holder,
                    file,
                    reply,
                } => {
                    let _ = reply.send(self.allocate_block(&holder, file).await);
                }
                Command::ExpireLeases { reply } => {
                    let _ = reply.send(self.expire_leases().await);
                }
                Command::Checkpoint { reply } => {
                    let _ = reply.send(self.checkpoint().await);
                }
                Command::Shutdown { reply } => {
                    let result = self.checkpoint().await.map(|_| ());
                    let _ = reply.send(result);
                    break;
                }
            }
        }
        info!("namespace sequencer stopped");
    }

    fn ensure_running(&self) -> Result<()> {
        match &self.halted {
            Some(reason) => Err(Error::SequencerHalted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Journals then applies a planned mutation. Nothing is applied unless
    /// the append succeeded.
    async fn commit<T>(&mut self, planned: Result<Planned<T>>) -> Result<T> {
        self.ensure_running()?;
        let Planned { ops, value } = planned?;
        if ops.is_empty() {
            return Ok(value);
        }

        let first = self.state.read().last_txid() + 1;
        let records: Vec<JournalRecord> = ops
            .into_iter()
            .zip(first..)
            .map(|(op, txid)| JournalRecord::new(txid, self.hlc.now(), op))
            .collect();

        if let Err(e) = self.journal.append(&records).await {
            error!(txid = first, error = %e, "journal append failed, mutation dropped");
            return Err(e);
        }

        {
            let mut state = self.state.write();
            for record in &records {
                if let Err(e) = state.apply(record) {
                    error!(
                        txid = record.txid,
                        error = %e,
                        "durable record failed to apply, refusing further mutations"
                    );
                    self.halted = Some(format!("record {} failed to apply: {e}", record.txid));
                    return Err(e);
                }
            }
        }

        self.finalize_closed(&records).await;

        self.since_checkpoint += records.len() as u64;
        if self.since_checkpoint >= self.config.checkpoint_txns {
            if let Err(e) = self.checkpoint().await {
                warn!(error = %e, "automatic checkpoint failed");
            }
        }
        Ok(value)
    }

    /// Reports the final block length of every file a record just closed.
    async fn finalize_closed(&self, records: &[JournalRecord]) {
        for record in records {
            let file = match record.op {
                Op::CloseFile { file, .. } | Op::RemoveLease { file } => file,
                _ => continue,
            };
            let last_block_length = {
                let state = self.state.read();
                state
                    .tree()
                    .get(file)
                    .and_then(|entry| entry.file())
                    .map(|f| f.last_block_length(self.config.block_size))
            };
            let Some(last_block_length) = last_block_length else {
                continue;
            };
            if let Err(e) = self.block_store.finalize(file, last_block_length).await {
                warn!(file = %file, error = %e, "block finalize failed");
            }
        }
    }

    async fn allocate_block(&mut self, holder: &HolderId, file: InodeId) -> Result<BlockHandle> {
        self.ensure_running()?;
        self.state.read().check_add_block(holder, file)?;
        let block = self.block_store.allocate_block(file).await?;
        self.commit(Ok(Planned {
            ops: vec![Op::AddBlock { file, block }],
            value: block,
        }))
        .await
    }

    async fn expire_leases(&mut self) -> Result<usize> {
        let now = self.hlc.now();
        let planned = self
            .state
            .read()
            .plan_expire(now, self.config.lease_timeout());
        if planned.value.is_empty() {
            return Ok(0);
        }
        let paths: Vec<Option<String>> = {
            let state = self.state.read();
            planned.value.iter().map(|l| state.path_of(l.file)).collect()
        };

        let expired = self.commit(Ok(planned)).await?;
        for (lease, path) in expired.iter().zip(paths) {
            info!(
                holder = %lease.holder,
                file = %lease.file,
                path = path.as_deref().unwrap_or("?"),
                last_renewed = %lease.last_renewed,
                "lease expired, file finalized"
            );
        }
        Ok(expired.len())
    }

    async fn checkpoint(&mut self) -> Result<u64> {
        self.ensure_running()?;
        let image = self.state.read().image();
        let last_txid = image.last_txid;
        self.journal.checkpoint(&image).await?;
        self.since_checkpoint = 0;
        info!(last_txid, entries = image.entries.len(), leases = image.leases.len(), "checkpoint written");
        Ok(last_txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hlc::ManualClock;
    use crate::journal::InMemoryJournal;

    async fn start(journal: &InMemoryJournal) -> NameNode {
        NameNode::start(
            NameNodeConfig::default(),
            Box::new(journal.clone()),
            Arc::new(InMemoryBlockStore::new()),
            Arc::new(ManualClock::new(1_000)),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_failed_append_leaves_state_unchanged() {
        let journal = InMemoryJournal::new();
        let node = start(&journal).await;
        node.mkdirs("/user").await.unwrap();
        let before = node.snapshot();

        journal.fail_next_appends(1);
        assert!(matches!(
            node.create(&"w".into(), "/user/f", false).await,
            Err(Error::JournalWriteFailure(_))
        ));
        assert_eq!(node.snapshot(), before);

        // the next request goes through
        node.create(&"w".into(), "/user/f", false).await.unwrap();
        assert!(node.exists("/user/f").unwrap());
    }

    #[tokio::test]
    async fn test_validation_errors_are_not_journaled() {
        let journal = InMemoryJournal::new();
        let node = start(&journal).await;
        node.mkdirs("/a").await.unwrap();
        let appends = journal.append_count();

        assert!(node.mkdirs("/a/$ ").await.is_err());
        assert!(node.rename("/missing", "/b").await.is_err());
        node.rename("/a", "/a").await.unwrap();
        assert_eq!(journal.append_count(), appends);
    }

    #[tokio::test]
    async fn test_one_append_per_operation() {
        let journal = InMemoryJournal::new();
        let node = start(&journal).await;

        node.create(&"w".into(), "/x/y/z", false).await.unwrap();
        assert_eq!(journal.append_count(), 1);
        assert_eq!(journal.records().len(), 4);

        let txids: Vec<u64> = journal.records().iter().map(|r| r.txid).collect();
        assert_eq!(txids, vec![1, 2, 3, 4]);
        let stamps: Vec<HlcTimestamp> = journal.records().iter().map(|r| r.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_shutdown_checkpoints() {
        let journal = InMemoryJournal::new();
        let node = start(&journal).await;
        node.mkdirs("/a/b").await.unwrap();
        let handle = node.handle();
        node.shutdown().await.unwrap();

        assert_eq!(journal.image().unwrap().last_txid, 2);
        assert!(journal.records().is_empty());
        assert!(matches!(handle.mkdirs("/c").await, Err(Error::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_apply_failure_halts_mutations() {
        let journal = InMemoryJournal::new();
        let (namesystem, _) = recover(&mut journal.clone()).await.unwrap();
        let mut sequencer = Sequencer {
            state: Arc::new(RwLock::new(namesystem)),
            journal: Box::new(journal.clone()),
            block_store: Arc::new(InMemoryBlockStore::new()),
            hlc: Hlc::with_source(Arc::new(ManualClock::new(1_000))),
            since_checkpoint: 0,
            config: NameNodeConfig::default(),
            halted: None,
        };

        let planned = sequencer.state.read().plan_mkdirs("/a");
        sequencer.commit(planned).await.unwrap();

        // durable, but names a file that does not exist
        let unplanned = Planned {
            ops: vec![Op::SyncFile {
                file: InodeId(99),
                length: 1,
            }],
            value: (),
        };
        assert!(matches!(
            sequencer.commit(Ok(unplanned)).await,
            Err(Error::PathNotFound { .. })
        ));
        assert_eq!(journal.records().len(), 2);

        let planned = sequencer.state.read().plan_mkdirs("/b");
        assert!(matches!(
            sequencer.commit(planned).await,
            Err(Error::SequencerHalted { .. })
        ));
        assert!(matches!(
            sequencer.checkpoint().await,
            Err(Error::SequencerHalted { .. })
        ));
        assert_eq!(journal.records().len(), 2);
        assert!(journal.image().is_none());
        assert!(!sequencer.state.read().exists("/b").unwrap());
    }
}
