//! Case 1: a leader commits with one follower down.
//!
//! Scenario:
//!
//! 1. Start 5 nodes, wait for a leader, kill one follower.
//! 2. Submit 10 commands one after another.
//!
//! Expected Result:
//!
//! - Every command commits in the leader's term, at increasing indexes.
//! - Every surviving node holds exactly those 10 commands, in order, all
//!   stamped with the leader's term. Noops are not commands.
//! - The killed node catches up after a restart.

use quorum_engine::Result;
use tracing_test::traced_test;

use crate::common::MiniCluster;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[traced_test]
async fn test_basic_append_entries() -> Result<()> {
    let mut cluster = MiniCluster::start(5)?;
    let leader = cluster.wait_for_leader().await;
    let term = cluster.status(leader).current_term;

    let killed = cluster
        .ids()
        .into_iter()
        .filter(|id| *id != leader)
        .last()
        .expect("four followers");
    cluster.kill(killed).await;

    let client = cluster.client()?;
    let messages: Vec<Vec<u8>> = (0..10).map(|i| format!("m{}", i).into_bytes()).collect();
    let mut last_index = 0;
    for message in &messages {
        let result = client.submit(message.clone()).await.expect("commit");
        assert_eq!(result.term, term);
        assert!(result.index > last_index);
        assert_eq!(&result.result, message);
        last_index = result.index;
    }

    cluster.wait_applied(last_index).await;
    for id in cluster.alive_ids() {
        let commands = cluster.commands(id);
        let data: Vec<Vec<u8>> = commands.iter().map(|(_, c)| c.data.clone()).collect();
        assert_eq!(data, messages, "commands of node {}", id);
        assert!(commands.iter().all(|(e, _)| e.term == term), "node {}", id);
        assert_eq!(cluster.log(id).last().map(|e| e.index), Some(last_index));
    }
    assert!(cluster.commands(killed).is_empty());

    cluster.restart(killed)?;
    cluster
        .wait_until("the restarted follower to catch up", |c| {
            c.status(killed).last_applied >= last_index
        })
        .await;
    assert_eq!(cluster.log(killed), cluster.log(leader));
    let applied: Vec<Vec<u8>> = cluster
        .state_machine(killed)
        .applied()
        .into_iter()
        .map(|a| a.data)
        .collect();
    assert_eq!(applied, messages);

    cluster.shutdown().await
}
