use super::checkpoint::NamespaceImage;
use super::codec;
use super::{Journal, JournalContents, JournalRecord};
use crate::prelude::*;
use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

const JOURNAL_FILE: &str = "journal";
const IMAGE_FILE: &str = "image";

/// Failure to inject into a later append, to exercise crash paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFault {
    /// Only the first `written` bytes of the batch reach the file
    ShortWrite { written: usize },
    /// The whole batch reaches the file, then the sync reports an error
    SyncFailure,
    /// A short write after which the file cannot be cut back either
    StuckShortWrite { written: usize },
}

/// Journal kept in a storage directory as two files: `image` (the last
/// checkpoint) and `journal` (framed records appended since).
///
/// A failed append is cut back off the file before the error is returned,
/// so the next append reuses its txids safely. If the cut fails the journal
/// refuses every append until a checkpoint rewrites the file.
#[derive(Debug)]
pub struct FileJournal {
    dir: PathBuf,
    writer: Option<File>,
    /// End of the last acknowledged append, once known
    committed_len: Option<u64>,
    poisoned: bool,
    /// Appends left before `WriteFault` fires
    fault: Option<(u64, WriteFault)>,
    fail_cut: bool,
}

impl FileJournal {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            writer: None,
            committed_len: None,
            poisoned: false,
            fault: None,
            fail_cut: false,
        })
    }

    pub fn journal_path(&self) -> PathBuf {
        self.dir.join(JOURNAL_FILE)
    }

    pub fn image_path(&self) -> PathBuf {
        self.dir.join(IMAGE_FILE)
    }

    /// Lets `after` appends through, then fails the next one with `fault`.
    pub fn inject_fault(&mut self, after: u64, fault: WriteFault) {
        self.fault = Some((after, fault));
    }

    fn next_fault(&mut self) -> Option<WriteFault> {
        let (remaining, fault) = self.fault?;
        if remaining == 0 {
            self.fault = None;
            Some(fault)
        } else {
            self.fault = Some((remaining - 1, fault));
            None
        }
    }

    async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes `bytes` to `path` through a temp file so readers only ever see
    /// the old or the new contents.
    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let tmp = path.with_extension("tmp");
        let mut file = File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await?;
        self.sync_dir().await
    }

    async fn sync_dir(&self) -> std::io::Result<()> {
        #[cfg(unix)]
        File::open(&self.dir).await?.sync_all().await?;
        Ok(())
    }

    /// Opens the journal for appending. The file only ever gets opened at an
    /// append boundary, so its length is the committed length.
    async fn open_writer(&mut self) -> std::io::Result<&mut File> {
        if self.writer.is_none() {
            let path = self.journal_path();
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            let len = file.metadata().await?.len();
            self.committed_len = Some(len);
            if len == 0 {
                let header = codec::encode_header();
                file.write_all(&header).await?;
                file.flush().await?;
                file.sync_all().await?;
                self.sync_dir().await?;
                self.committed_len = Some(header.len() as u64);
            }
            self.writer = Some(file);
        }
        match self.writer.as_mut() {
            Some(file) => Ok(file),
            None => Err(std::io::Error::other("journal writer unavailable")),
        }
    }

    async fn write_batch(&mut self, batch: &[u8]) -> std::io::Result<()> {
        let fault = self.next_fault();
        let file = self.open_writer().await?;
        match fault {
            None => {
                file.write_all(batch).await?;
                file.flush().await?;
                file.sync_data().await
            }
            Some(WriteFault::SyncFailure) => {
                file.write_all(batch).await?;
                file.flush().await?;
                Err(std::io::Error::other("injected sync failure"))
            }
            Some(WriteFault::ShortWrite { written } | WriteFault::StuckShortWrite { written }) => {
                file.write_all(&batch[..written.min(batch.len())]).await?;
                file.flush().await?;
                self.fail_cut = matches!(fault, Some(WriteFault::StuckShortWrite { .. }));
                Err(std::io::Error::other("injected short write"))
            }
        }
    }

    /// Cuts the journal back to the end of the last acknowledged append.
    async fn roll_back(&mut self) -> std::io::Result<()> {
        self.writer = None;
        if std::mem::take(&mut self.fail_cut) {
            return Err(std::io::Error::other("injected truncate failure"));
        }
        // unset until loaded or opened, so nothing reached the file
        let Some(len) = self.committed_len else {
            return Ok(());
        };
        let path = self.journal_path();
        let file = match OpenOptions::new().write(true).open(&path).await {
            Ok(file) => file,
            // never created, so nothing reached it
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        file.set_len(len).await?;
        file.sync_all().await
    }
}

#[async_trait]
impl Journal for FileJournal {
    async fn load(&mut self) -> Result<JournalContents> {
        if self.poisoned {
            self.roll_back().await?;
        }
        self.writer = None;

        let image = match Self::read_optional(&self.image_path()).await? {
            Some(bytes) => Some(NamespaceImage::decode(&bytes)?),
            None => None,
        };

        let path = self.journal_path();
        let bytes = Self::read_optional(&path).await?.unwrap_or_default();
        let decoded = codec::decode(&bytes)?;

        if decoded.torn_bytes > 0 {
            warn!(
                path = %path.display(),
                torn_bytes = decoded.torn_bytes,
                valid_len = decoded.valid_len,
                "truncating torn tail from journal"
            );
            let file = OpenOptions::new().write(true).open(&path).await?;
            file.set_len(decoded.valid_len as u64).await?;
            file.sync_all().await?;
        }
        self.committed_len = Some(decoded.valid_len as u64);
        self.poisoned = false;

        Ok(JournalContents {
            image,
            records: decoded.records,
            torn_bytes: decoded.torn_bytes,
        })
    }

    async fn append(&mut self, records: &[JournalRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if self.poisoned {
            return Err(Error::JournalWriteFailure(std::io::Error::other(
                "journal refuses appends after a failed write it could not undo",
            )));
        }
        let batch = codec::encode_batch(records)?;
        let result = self.write_batch(&batch).await;
        let Err(e) = result else {
            self.committed_len = self.committed_len.map(|len| len + batch.len() as u64);
            return Ok(());
        };

        match self.roll_back().await {
            Ok(()) => warn!(
                first_txid = records[0].txid,
                error = %e,
                "journal append failed, partial write cut back"
            ),
            Err(cut) => {
                error!(
                    first_txid = records[0].txid,
                    error = %e,
                    cut_error = %cut,
                    "journal append failed and could not be undone, refusing further appends"
                );
                self.poisoned = true;
            }
        }
        Err(Error::JournalWriteFailure(e))
    }

    async fn checkpoint(&mut self, image: &NamespaceImage) -> Result<()> {
        self.write_atomic(&self.image_path(), &image.encode()?)
            .await
            .map_err(Error::JournalWriteFailure)?;

        // keep whatever the image does not cover, and nothing past the last
        // acknowledged append
        let path = self.journal_path();
        let mut bytes = Self::read_optional(&path).await?.unwrap_or_default();
        if let Some(len) = self.committed_len {
            bytes.truncate(len as usize);
        }
        let kept: Vec<JournalRecord> = codec::decode(&bytes)?
            .records
            .into_iter()
            .filter(|r| r.txid > image.last_txid)
            .collect();
        let mut fresh = codec::encode_header().to_vec();
        fresh.extend(codec::encode_batch(&kept)?);

        self.writer = None;
        self.write_atomic(&path, &fresh)
            .await
            .map_err(Error::JournalWriteFailure)?;
        self.committed_len = Some(fresh.len() as u64);
        if self.poisoned {
            info!("journal rewritten by checkpoint, accepting appends again");
            self.poisoned = false;
        }
        debug!(
            last_txid = image.last_txid,
            kept = kept.len(),
            "journal truncated after checkpoint"
        );
        Ok(())
    }
}
