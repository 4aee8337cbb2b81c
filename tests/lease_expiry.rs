// Lease expiry driven by the lease monitor and a hand-driven clock.

use lisns::hlc::ManualClock;
use lisns::{HolderId, InMemoryBlockStore, InMemoryJournal, InodeId, NameNode, NameNodeConfig};
use std::sync::Arc;
use std::time::Duration;

const BLOCK: u64 = 1024;

struct Harness {
    clock: Arc<ManualClock>,
    blocks: Arc<InMemoryBlockStore>,
    journal: InMemoryJournal,
    config: NameNodeConfig,
}

impl Harness {
    fn new() -> Self {
        Self {
            clock: Arc::new(ManualClock::new(1_000_000)),
            blocks: Arc::new(InMemoryBlockStore::new()),
            journal: InMemoryJournal::new(),
            config: NameNodeConfig {
                lease_timeout_ms: 1_000,
                monitor_interval_ms: 10,
                block_size: BLOCK,
                ..NameNodeConfig::default()
            },
        }
    }

    async fn start(&self) -> NameNode {
        NameNode::start(
            self.config.clone(),
            Box::new(self.journal.clone()),
            self.blocks.clone(),
            self.clock.clone(),
        )
        .await
        .unwrap()
    }
}

async fn wait_for_release(node: &NameNode, file: InodeId) {
    for _ in 0..200 {
        if node.lease(file).is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("lease on {file} was never reclaimed");
}

#[tokio::test]
async fn test_monitor_reclaims_stale_lease() {
    let h = Harness::new();
    let node = h.start().await;
    let writer = HolderId::from("writer");

    let file = node.create(&writer, "/logs/app.log", false).await.unwrap();
    node.allocate_block(&writer, file).await.unwrap();
    node.allocate_block(&writer, file).await.unwrap();
    node.sync(&writer, file, BLOCK + 300).await.unwrap();

    h.clock.advance(Duration::from_millis(1_500));
    wait_for_release(&node, file).await;

    let status = node.stat("/logs/app.log").unwrap();
    assert_eq!(status.length, BLOCK + 300);
    assert!(!status.under_construction);
    assert_eq!(h.blocks.finalized_length(file), Some(300));

    // the file is free for another writer now
    let other = HolderId::from("other");
    assert_eq!(node.append(&other, "/logs/app.log").await.unwrap(), file);
    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_heartbeat_keeps_leases_alive() {
    let h = Harness::new();
    let node = h.start().await;
    let writer = HolderId::from("writer");
    let a = node.create(&writer, "/a", false).await.unwrap();
    let b = node.create(&writer, "/b", false).await.unwrap();

    for _ in 0..5 {
        h.clock.advance(Duration::from_millis(600));
        assert_eq!(node.renew_holder(&writer).await.unwrap(), 2);
    }
    assert_eq!(node.expire_leases().await.unwrap(), 0);
    assert!(node.lease(a).is_some());
    assert!(node.lease(b).is_some());

    h.clock.advance(Duration::from_millis(1_001));
    wait_for_release(&node, a).await;
    wait_for_release(&node, b).await;
    assert!(node.leases_of(&writer).is_empty());
    assert_eq!(node.renew_holder(&writer).await.unwrap(), 0);
    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rename_does_not_reset_expiry() {
    let h = Harness::new();
    let node = h.start().await;
    let writer = HolderId::from("writer");
    let file = node.create(&writer, "/src/f", false).await.unwrap();
    let granted = node.lease(file).unwrap().last_renewed;

    h.clock.advance(Duration::from_millis(400));
    node.rename("/src", "/dst").await.unwrap();
    assert_eq!(node.lease(file).unwrap().last_renewed, granted);

    h.clock.advance(Duration::from_millis(700));
    wait_for_release(&node, file).await;
    assert!(node.exists("/dst/f").unwrap());
    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_recovered_lease_expires_after_downtime() {
    let h = Harness::new();
    let node = h.start().await;
    let writer = HolderId::from("writer");
    let file = node.create(&writer, "/f", false).await.unwrap();
    node.sync(&writer, file, 77).await.unwrap();
    node.halt().await;

    // the node was down long enough for the lease to lapse
    h.clock.advance(Duration::from_secs(5));
    let node = h.start().await;
    assert_eq!(node.recovery().open_leases, 1);
    wait_for_release(&node, file).await;
    assert_eq!(node.stat("/f").unwrap().length, 77);
    assert_eq!(h.blocks.finalized_length(file), Some(0));
    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_close_finalizes_last_block() {
    let h = Harness::new();
    let node = h.start().await;
    let writer = HolderId::from("writer");
    let file = node.create(&writer, "/f", false).await.unwrap();
    let block = node.allocate_block(&writer, file).await.unwrap();
    assert_eq!(h.blocks.blocks_of(file), vec![block]);

    node.close(&writer, file, 10).await.unwrap();
    assert_eq!(h.blocks.finalized_length(file), Some(10));
    assert!(node.allocate_block(&writer, file).await.is_err());
    node.shutdown().await.unwrap();
}
