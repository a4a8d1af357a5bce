//! An entry held by the old leader and one follower commits once that
//! follower leads.
//!
//! Scenario:
//!
//! 1. Start 5 nodes, wait for leader L. Keep follower F, kill the other 3.
//! 2. Submit one command to L. Only L and F store it; it cannot commit.
//! 3. Isolate L, restart 2 of the killed followers.
//!
//! Expected Result:
//!
//! - F is the only electable node: its log is the most up to date among
//!   the reachable three.
//! - F's noop commits the command, which then sits at the same index on
//!   every live node and is applied exactly once by the reachable ones.

use std::time::Duration;

use quorum_engine::proto::client::ClientRequest;
use quorum_engine::ClientApiError;
use quorum_engine::Result;
use tracing_test::traced_test;

use crate::common::MiniCluster;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[traced_test]
async fn test_old_leader_commit() -> Result<()> {
    let mut cluster = MiniCluster::start(5)?;
    let leader = cluster.wait_for_leader().await;
    let followers: Vec<u32> = cluster.ids().into_iter().filter(|id| *id != leader).collect();
    let follower_to_commit = followers[0];
    for id in &followers[1..] {
        cluster.kill(*id).await;
    }

    let request = ClientRequest {
        client_id: "old-leader".to_string(),
        sequence: 1,
        command: b"m0".to_vec(),
    };
    let response = cluster
        .handle(leader)
        .submit(request, Duration::from_millis(500))
        .await;
    assert_eq!(response, Err(ClientApiError::Timeout));

    cluster
        .wait_until("the follower to store the command", |c| {
            c.commands(follower_to_commit).iter().any(|(_, cmd)| cmd.data == b"m0")
        })
        .await;
    let (entry, _) = cluster
        .commands(follower_to_commit)
        .into_iter()
        .find(|(_, cmd)| cmd.data == b"m0")
        .expect("stored");
    assert!(cluster.status(follower_to_commit).commit_index < entry.index);

    cluster.isolate(leader);
    for id in &followers[1..3] {
        cluster.restart(*id)?;
    }

    let new_leader = cluster.wait_for_new_leader(leader).await;
    assert_eq!(new_leader, follower_to_commit);

    cluster.wait_applied(entry.index).await;
    for id in cluster.alive_ids() {
        let stored = cluster.log(id).into_iter().find(|e| e.index == entry.index);
        assert_eq!(stored.as_ref(), Some(&entry), "node {}", id);
    }
    for id in cluster.reachable_ids() {
        let applied: Vec<Vec<u8>> = cluster
            .state_machine(id)
            .applied()
            .into_iter()
            .map(|a| a.data)
            .collect();
        assert_eq!(applied, vec![b"m0".to_vec()], "node {}", id);
    }

    cluster.shutdown().await
}
