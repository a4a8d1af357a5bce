//! Kill the leader of a 5-node cluster three times in a row.
//!
//! Scenario:
//!
//! 1. Start 5 nodes and wait for a leader.
//! 2. Kill it, wait for the next one. Repeat three times.
//! 3. With 2 of 5 nodes left no leader may emerge.
//!
//! Expected Result:
//!
//! - Every round elects a node other than the killed ones, in a higher term,
//!   within two election timeouts plus slack of the kill.
//! - Killed nodes still count toward the quorum size, so two survivors stay
//!   leaderless.

use std::time::Duration;

use quorum_engine::Result;
use tokio::time::Instant;
use tracing_test::traced_test;

use crate::common::MiniCluster;
use crate::common::ELECTION_BOUND;
use crate::common::ELECTION_TIMEOUT_MAX_MS;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[traced_test]
async fn test_leader_reelected_after_each_kill() -> Result<()> {
    let mut cluster = MiniCluster::start(5)?;

    let mut killed = Vec::new();
    let mut last_term = 0;
    let mut killed_at = Instant::now();
    for round in 0..3 {
        let leader = cluster.wait_for_leader().await;
        if round > 0 {
            let took = killed_at.elapsed();
            assert!(
                took < ELECTION_BOUND,
                "round {}: leader {} took {:?} to emerge",
                round,
                leader,
                took
            );
        }
        let term = cluster.status(leader).current_term;
        assert!(!killed.contains(&leader));
        assert!(term > last_term, "term {} after term {}", term, last_term);
        last_term = term;

        cluster.kill(leader).await;
        killed_at = Instant::now();
        killed.push(leader);
    }

    assert_eq!(cluster.alive_ids().len(), 2);
    cluster
        .assert_no_leader(Duration::from_millis(ELECTION_TIMEOUT_MAX_MS * 5))
        .await;

    cluster.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[traced_test]
async fn test_restarted_leader_rejoins_as_follower() -> Result<()> {
    let mut cluster = MiniCluster::start(3)?;
    let leader = cluster.wait_for_leader().await;
    let term = cluster.status(leader).current_term;

    cluster.kill(leader).await;
    let new_leader = cluster.wait_for_leader().await;
    assert_ne!(new_leader, leader);

    cluster.restart(leader)?;
    cluster
        .wait_until("old leader to follow the new one", |c| {
            let status = c.status(leader);
            status.leader_id == Some(new_leader) && status.current_term > term
        })
        .await;
    assert_eq!(cluster.leader(), Some(new_leader));

    cluster.shutdown().await
}
