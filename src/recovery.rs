// Startup recovery: newest image plus every later journal record, in order.

use crate::journal::Journal;
use crate::namesystem::Namesystem;
use crate::prelude::*;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Last txid covered by the loaded image, if there was one
    pub image_txid: Option<u64>,
    pub replayed: usize,
    /// Records already covered by the image
    pub skipped: usize,
    pub torn_bytes: usize,
    pub last_txid: u64,
    pub open_leases: usize,
}

/// Rebuilds the namespace from `journal`. Any record that does not follow
/// its predecessor or does not apply cleanly is `CorruptJournal`.
pub async fn recover(journal: &mut dyn Journal) -> Result<(Namesystem, RecoveryReport)> {
    let contents = journal.load().await?;
    let mut report = RecoveryReport {
        torn_bytes: contents.torn_bytes,
        ..Default::default()
    };

    let mut ns = match contents.image {
        Some(image) => {
            report.image_txid = Some(image.last_txid);
            Namesystem::from_image(image)?
        }
        None => Namesystem::new(),
    };

    for record in &contents.records {
        if record.txid <= ns.last_txid() {
            report.skipped += 1;
            continue;
        }
        let expected = ns.last_txid() + 1;
        if record.txid != expected {
            return Err(Error::CorruptJournal {
                reason: format!("expected txid {expected}, found {}", record.txid),
            });
        }
        ns.apply(record).map_err(|e| Error::CorruptJournal {
            reason: format!("record {} ({}) does not apply: {e}", record.txid, record.op.name()),
        })?;
        report.replayed += 1;
    }

    report.last_txid = ns.last_txid();
    report.open_leases = ns.leases().len();
    info!(
        image_txid = ?report.image_txid,
        replayed = report.replayed,
        skipped = report.skipped,
        torn_bytes = report.torn_bytes,
        last_txid = report.last_txid,
        open_leases = report.open_leases,
        "namespace recovered"
    );
    Ok((ns, report))
}
