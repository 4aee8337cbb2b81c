// Journal timestamps stay ordered across restarts and clock skew

use lisns::hlc::{Hlc, HlcTimestamp, ManualClock};
use lisns::{HolderId, InMemoryBlockStore, InMemoryJournal, NameNode, NameNodeConfig};
use std::sync::Arc;
use std::time::Duration;

async fn start(journal: &InMemoryJournal, clock: &Arc<ManualClock>) -> NameNode {
    NameNode::start(
        NameNodeConfig::default(),
        Box::new(journal.clone()),
        Arc::new(InMemoryBlockStore::new()),
        clock.clone(),
    )
    .await
    .unwrap()
}

#[test]
fn test_skewed_nodes_converge() {
    let ahead = Arc::new(ManualClock::new(130_000));
    let behind = Arc::new(ManualClock::new(75_000));
    let node_a = Hlc::with_source(ahead.clone());
    let node_b = Hlc::with_source(behind.clone());

    let sent = node_a.now();
    node_b.observe(sent);
    let reply = node_b.now();
    assert!(reply > sent);
    assert_eq!(reply, HlcTimestamp::new(130_000, 1));

    // b's wall clock catches up and takes over
    behind.advance(Duration::from_secs(60));
    assert_eq!(node_b.now(), HlcTimestamp::new(135_000, 0));
}

#[tokio::test]
async fn test_timestamps_survive_clock_stepping_back() {
    let journal = InMemoryJournal::new();
    let clock = Arc::new(ManualClock::new(50_000));
    let writer = HolderId::from("writer");

    let node = start(&journal, &clock).await;
    let file = node.create(&writer, "/f", false).await.unwrap();
    node.sync(&writer, file, 10).await.unwrap();
    let renewed = node.lease(file).unwrap().last_renewed;
    node.halt().await;

    // the host comes back with its clock set 40s earlier
    clock.set(10_000);
    let node = start(&journal, &clock).await;
    node.renew_lease(&writer, file).await.unwrap();
    assert!(node.lease(file).unwrap().last_renewed > renewed);

    let stamps: Vec<HlcTimestamp> = journal.records().iter().map(|r| r.timestamp).collect();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));

    // nothing expires just because the wall clock went backwards
    assert_eq!(node.expire_leases().await.unwrap(), 0);
    node.shutdown().await.unwrap();
}
