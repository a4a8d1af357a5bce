//! Hand leadership to a chosen node with TimeoutNow.
//!
//! Scenario:
//!
//! 1. Start 5 nodes and wait for a leader.
//! 2. Pick a random other node and ask the leader to transfer to it.
//!
//! Expected Result:
//!
//! - The chosen node leads in a higher term.
//! - Client commands commit under the new leader.

use quorum_engine::Result;
use rand::seq::SliceRandom;
use tracing::warn;
use tracing_test::traced_test;

use crate::common::MiniCluster;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[traced_test]
async fn test_enforce_leader() -> Result<()> {
    let cluster = MiniCluster::start(5)?;
    let leader = cluster.wait_for_leader().await;
    let term = cluster.status(leader).current_term;

    let candidates: Vec<u32> = cluster.ids().into_iter().filter(|id| *id != leader).collect();
    let target = *candidates.choose(&mut rand::thread_rng()).expect("four followers");

    // a racing election can move leadership elsewhere first; ask again
    for _ in 0..5 {
        let current = cluster.wait_for_leader().await;
        if current == target {
            break;
        }
        if let Err(e) = cluster.transfer(current, target).await {
            warn!("transfer {} -> {} failed: {:?}", current, target, e);
        }
        cluster
            .wait_until("a leader after the transfer", |c| c.leader().is_some())
            .await;
    }

    assert_eq!(cluster.wait_for_leader().await, target);
    assert!(cluster.status(target).current_term > term);

    let client = cluster.client()?;
    let result = client.submit(b"after-transfer".to_vec()).await.expect("commit");
    assert_eq!(result.term, cluster.status(target).current_term);
    assert_eq!(result.result, b"after-transfer".to_vec());

    cluster.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[traced_test]
async fn test_transfer_to_itself_is_rejected() -> Result<()> {
    let cluster = MiniCluster::start(3)?;
    let leader = cluster.wait_for_leader().await;

    assert!(cluster.transfer(leader, leader).await.is_err());
    assert!(cluster.transfer(leader, 42).await.is_err());
    assert_eq!(cluster.leader(), Some(leader));

    cluster.shutdown().await
}
