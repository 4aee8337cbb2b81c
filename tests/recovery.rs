// Journal durability and recovery across node restarts.

use lisns::hlc::ManualClock;
use lisns::journal::{FileJournal, WriteFault};
use lisns::recovery::recover;
use lisns::{
    Error, HolderId, InMemoryBlockStore, InMemoryJournal, NameNode, NameNodeConfig,
};
use std::path::Path;
use std::sync::Arc;

async fn open(dir: &Path) -> lisns::Result<NameNode> {
    NameNode::open(NameNodeConfig::with_storage_dir(dir)).await
}

async fn populate(node: &NameNode) {
    let writer = HolderId::from("writer");
    node.mkdirs("/data/logs").await.unwrap();
    let log = node.create(&writer, "/data/logs/app.log", false).await.unwrap();
    node.sync(&writer, log, 512).await.unwrap();
    let done = node.create(&writer, "/data/done", false).await.unwrap();
    node.close(&writer, done, 64).await.unwrap();
    node.rename("/data/logs", "/data/archive").await.unwrap();
}

#[tokio::test]
async fn test_recovering_twice_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    let node = open(dir.path()).await.unwrap();
    populate(&node).await;
    let before = node.snapshot();
    node.halt().await;

    let mut journal = FileJournal::open(dir.path()).await.unwrap();
    let (first, report) = recover(&mut journal).await.unwrap();
    let (second, _) = recover(&mut journal).await.unwrap();
    assert_eq!(first, before);
    assert_eq!(first, second);
    assert_eq!(report.image_txid, None);
    assert_eq!(report.open_leases, 1);
    assert_eq!(report.last_txid, before.last_txid());
}

#[tokio::test]
async fn test_checkpoint_plus_tail() {
    let dir = tempfile::tempdir().unwrap();
    let node = open(dir.path()).await.unwrap();
    populate(&node).await;
    let image_txid = node.checkpoint().await.unwrap();
    node.mkdirs("/after/checkpoint").await.unwrap();
    let before = node.snapshot();
    node.halt().await;

    let node = open(dir.path()).await.unwrap();
    assert_eq!(node.recovery().image_txid, Some(image_txid));
    assert_eq!(node.recovery().replayed, 2);
    assert_eq!(node.snapshot(), before);
    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_automatic_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let config = NameNodeConfig {
        checkpoint_txns: 3,
        ..NameNodeConfig::with_storage_dir(dir.path())
    };
    let node = NameNode::open(config.clone()).await.unwrap();
    for i in 0..4 {
        node.mkdirs(&format!("/d{i}")).await.unwrap();
    }
    let before = node.snapshot();
    node.halt().await;

    let node = NameNode::open(config).await.unwrap();
    assert_eq!(node.recovery().image_txid, Some(3));
    assert_eq!(node.recovery().replayed, 1);
    assert_eq!(node.snapshot(), before);
}

#[tokio::test]
async fn test_torn_tail_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let node = open(dir.path()).await.unwrap();
    populate(&node).await;
    let before = node.snapshot();
    node.halt().await;

    // a sound frame header promising more payload than made it to disk
    let journal_path = dir.path().join("journal");
    let intact = std::fs::metadata(&journal_path).unwrap().len();
    let mut bytes = std::fs::read(&journal_path).unwrap();
    let len = 200u32.to_le_bytes();
    bytes.extend_from_slice(&len);
    bytes.extend_from_slice(&crc32fast::hash(&len).to_le_bytes());
    bytes.extend_from_slice(&[0xab; 4]);
    bytes.extend_from_slice(&[0x01; 17]);
    std::fs::write(&journal_path, bytes).unwrap();

    let node = open(dir.path()).await.unwrap();
    assert_eq!(node.recovery().torn_bytes, 29);
    assert_eq!(node.snapshot(), before);
    assert_eq!(std::fs::metadata(&journal_path).unwrap().len(), intact);

    // new records land after the truncation point
    node.mkdirs("/fresh").await.unwrap();
    node.halt().await;
    let node = open(dir.path()).await.unwrap();
    assert!(node.exists("/fresh").unwrap());
    assert!(node.exists("/data/archive/app.log").unwrap());
}

#[tokio::test]
async fn test_corrupt_frame_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let node = open(dir.path()).await.unwrap();
    populate(&node).await;
    node.halt().await;

    let journal_path = dir.path().join("journal");
    let mut bytes = std::fs::read(&journal_path).unwrap();
    // inside the payload of the first frame (6 byte file header, 12 byte frame header)
    bytes[6 + 12 + 2] ^= 0x5a;
    std::fs::write(&journal_path, bytes).unwrap();

    let err = open(dir.path()).await.unwrap_err();
    assert!(matches!(err, Error::CorruptJournal { .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_damaged_frame_length_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let node = open(dir.path()).await.unwrap();
    for i in 0..5 {
        node.mkdirs(&format!("/d{i}")).await.unwrap();
    }
    node.halt().await;

    let journal_path = dir.path().join("journal");
    let mut bytes = std::fs::read(&journal_path).unwrap();
    let original_len = bytes.len();
    // high byte of the second frame's length: it now runs past the end of the file
    let first_len = u32::from_le_bytes(bytes[6..10].try_into().unwrap()) as usize;
    let second = 6 + 12 + first_len;
    bytes[second + 3] ^= 0x40;
    std::fs::write(&journal_path, &bytes).unwrap();

    let err = open(dir.path()).await.unwrap_err();
    assert!(matches!(err, Error::CorruptJournal { .. }));
    assert!(err.is_fatal());
    // nothing was cut away
    assert_eq!(std::fs::read(&journal_path).unwrap().len(), original_len);
}

#[tokio::test]
async fn test_failed_append_does_not_resurface() {
    let dir = tempfile::tempdir().unwrap();
    let faults = [
        ("sync", WriteFault::SyncFailure),
        ("short", WriteFault::ShortWrite { written: 7 }),
    ];
    for (name, fault) in faults {
        let storage = dir.path().join(name);
        let mut journal = FileJournal::open(&storage).await.unwrap();
        journal.inject_fault(2, fault);
        let node = NameNode::start(
            NameNodeConfig::with_storage_dir(&storage),
            Box::new(journal),
            Arc::new(InMemoryBlockStore::new()),
            Arc::new(ManualClock::new(10_000)),
        )
        .await
        .unwrap();

        node.mkdirs("/a").await.unwrap();
        node.mkdirs("/b").await.unwrap();
        assert!(matches!(
            node.mkdirs("/failed").await,
            Err(Error::JournalWriteFailure(_))
        ));
        // reuses the txid the failed append carried
        node.mkdirs("/acked").await.unwrap();
        let before = node.snapshot();
        node.halt().await;

        let node = open(&storage).await.unwrap();
        assert_eq!(node.snapshot(), before, "{fault:?}");
        assert!(!node.exists("/failed").unwrap());
        assert!(node.exists("/acked").unwrap());
        assert_eq!(node.recovery().torn_bytes, 0);
    }
}

#[tokio::test]
async fn test_unrecoverable_append_refuses_later_writes() {
    let dir = tempfile::tempdir().unwrap();
    let mut journal = FileJournal::open(dir.path()).await.unwrap();
    journal.inject_fault(1, WriteFault::StuckShortWrite { written: 9 });
    let node = NameNode::start(
        NameNodeConfig::with_storage_dir(dir.path()),
        Box::new(journal),
        Arc::new(InMemoryBlockStore::new()),
        Arc::new(ManualClock::new(10_000)),
    )
    .await
    .unwrap();

    node.mkdirs("/a").await.unwrap();
    let before = node.snapshot();
    assert!(node.mkdirs("/failed").await.is_err());
    assert!(matches!(
        node.mkdirs("/later").await,
        Err(Error::JournalWriteFailure(_))
    ));
    assert_eq!(node.snapshot(), before);
    node.halt().await;

    // the stray bytes are an unacknowledged tail
    let node = open(dir.path()).await.unwrap();
    assert_eq!(node.snapshot(), before);
    assert_eq!(node.recovery().torn_bytes, 9);
}

#[tokio::test]
async fn test_corrupt_image_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let node = open(dir.path()).await.unwrap();
    populate(&node).await;
    node.shutdown().await.unwrap();

    let image_path = dir.path().join("image");
    let mut bytes = std::fs::read(&image_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&image_path, bytes).unwrap();

    let err = open(dir.path()).await.unwrap_err();
    assert!(matches!(err, Error::CorruptImage { .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_journal_failure_fails_closed() {
    let journal = InMemoryJournal::new();
    let node = NameNode::start(
        NameNodeConfig::default(),
        Box::new(journal.clone()),
        Arc::new(InMemoryBlockStore::new()),
        Arc::new(ManualClock::new(10_000)),
    )
    .await
    .unwrap();
    let writer = HolderId::from("writer");
    let file = node.create(&writer, "/a/f", false).await.unwrap();
    let before = node.snapshot();

    journal.fail_next_appends(3);
    assert!(matches!(
        node.rename("/a", "/b").await,
        Err(Error::JournalWriteFailure(_))
    ));
    assert!(matches!(
        node.sync(&writer, file, 99).await,
        Err(Error::JournalWriteFailure(_))
    ));
    assert!(matches!(
        node.renew_holder(&writer).await,
        Err(Error::JournalWriteFailure(_))
    ));
    assert_eq!(node.snapshot(), before);

    // what recovery sees matches what clients saw
    let mut reloaded = journal.clone();
    let (recovered, _) = recover(&mut reloaded).await.unwrap();
    assert_eq!(recovered, before);
    assert_eq!(
        journal.records().last().map(|r| r.txid),
        Some(before.last_txid())
    );
}
