//! An entry held only by a minority is overwritten by the next leader.
//!
//! Scenario:
//!
//! 1. Start 5 nodes, wait for leader L. Keep follower F, kill the other 3.
//! 2. Submit one command to L. Only L and F store it.
//! 3. Kill L and F, restart the other 3.
//! 4. Commit a different command under the new leader, then bring L and F
//!    back.
//!
//! Expected Result:
//!
//! - The new leader never reports the first command committed and no state
//!   machine applies it.
//! - Once L and F rejoin, the entry is gone from every log.

use std::time::Duration;

use quorum_engine::proto::client::ClientRequest;
use quorum_engine::ClientApiError;
use quorum_engine::Result;
use tracing_test::traced_test;

use crate::common::MiniCluster;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[traced_test]
async fn test_old_leader_not_commit() -> Result<()> {
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

    cluster.kill(leader).await;
    cluster.kill(follower_to_commit).await;
    for id in &followers[1..] {
        cluster.restart(*id)?;
    }

    let new_leader = cluster.wait_for_leader().await;
    assert!(followers[1..].contains(&new_leader));

    let client = cluster.client()?;
    let result = client.submit(b"m1".to_vec()).await.expect("commit");
    assert_eq!(result.term, cluster.status(new_leader).current_term);
    cluster.wait_applied(result.index).await;

    for id in cluster.alive_ids() {
        assert!(
            !cluster.commands(id).iter().any(|(_, cmd)| cmd.data == b"m0"),
            "node {} holds the uncommitted command",
            id
        );
        let applied: Vec<Vec<u8>> = cluster
            .state_machine(id)
            .applied()
            .into_iter()
            .map(|a| a.data)
            .collect();
        assert_eq!(applied, vec![b"m1".to_vec()], "node {}", id);
    }

    cluster.restart(leader)?;
    cluster.restart(follower_to_commit)?;
    cluster
        .wait_until("the rejoined nodes to drop the stale entry", |c| {
            c.alive_ids()
                .into_iter()
                .all(|id| !c.commands(id).iter().any(|(_, cmd)| cmd.data == b"m0"))
        })
        .await;

    let leader_now = cluster.wait_for_leader().await;
    cluster
        .wait_until("every log to match the leader", |c| {
            let expected = c.log(leader_now);
            c.alive_ids().into_iter().all(|id| c.log(id) == expected)
        })
        .await;
    for id in [leader, follower_to_commit] {
        let applied: Vec<Vec<u8>> = cluster
            .state_machine(id)
            .applied()
            .into_iter()
            .map(|a| a.data)
            .collect();
        assert!(!applied.contains(&b"m0".to_vec()), "node {}", id);
    }

    cluster.shutdown().await
}
