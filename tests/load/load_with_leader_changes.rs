//! Concurrent clients while leadership keeps moving.
//!
//! Scenario:
//!
//! 1. Start 5 nodes.
//! 2. 10 clients each submit 500 commands, one at a time.
//! 3. Every 50 submissions across all clients, force a leader change,
//!    alternating cooperative transfer and isolating the leader.
//!
//! Expected Result:
//!
//! - Every submission eventually succeeds.
//! - Each live log holds every command exactly once, in the order its
//!   client submitted them, and every state machine applied them once.

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use quorum_engine::ClientApiError;
use quorum_engine::Result;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::info;
use tracing::warn;

use crate::common::within;
use crate::common::MiniCluster;

const NUM_CLIENTS: usize = 10;
const COMMANDS_PER_CLIENT: usize = 500;
const CHANGE_LEADER_EVERY: usize = 50;

type ClientOutcome = std::result::Result<(String, Vec<Vec<u8>>), ClientApiError>;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_load_with_leader_changes() -> Result<()> {
    let cluster = MiniCluster::start(5)?;
    cluster.wait_for_leader().await;

    let progress = Arc::new(AtomicUsize::new(0));
    let mut clients: Vec<JoinHandle<ClientOutcome>> = Vec::with_capacity(NUM_CLIENTS);
    for _ in 0..NUM_CLIENTS {
        let client = cluster.client()?;
        let progress = progress.clone();
        clients.push(tokio::spawn(async move {
            let mut sent = Vec::with_capacity(COMMANDS_PER_CLIENT);
            for i in 0..COMMANDS_PER_CLIENT {
                let command = format!("{}-{}", client.client_id(), i).into_bytes();
                client.submit(command.clone()).await?;
                sent.push(command);
                progress.fetch_add(1, Ordering::AcqRel);
            }
            Ok::<_, ClientApiError>((client.client_id().to_string(), sent))
        }));
    }

    let mut last_step = 0;
    let mut changes = 0;
    while clients.iter().any(|c| !c.is_finished()) {
        let step = progress.load(Ordering::Acquire);
        if step - last_step < CHANGE_LEADER_EVERY {
            sleep(Duration::from_millis(10)).await;
            continue;
        }
        last_step = step;

        let Some(old_leader) = cluster.leader() else {
            continue;
        };
        let new_leader = if changes % 2 == 0 {
            change_leader_by_transfer(&cluster, old_leader).await
        } else {
            cluster.change_leader_by_isolation(old_leader).await
        };
        assert_ne!(new_leader, old_leader);
        changes += 1;
    }
    info!("leader changed {} times", changes);

    let mut expected: HashMap<String, Vec<Vec<u8>>> = HashMap::new();
    for client in clients {
        let (client_id, sent) = client
            .await
            .expect("client task panicked")
            .expect("client gave up");
        assert_eq!(sent.len(), COMMANDS_PER_CLIENT);
        expected.insert(client_id, sent);
    }
    assert!(changes > 0);

    let committed = within("logs to converge", Duration::from_secs(30), async {
        loop {
            let leader = cluster.wait_for_leader().await;
            let last = cluster.status(leader).last_log_index;
            let caught_up = cluster
                .alive_ids()
                .into_iter()
                .all(|id| cluster.status(id).last_applied == last);
            if caught_up {
                break last;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    for id in cluster.alive_ids() {
        let mut in_log: HashMap<String, Vec<Vec<u8>>> = HashMap::new();
        for (entry, command) in cluster.commands(id) {
            if entry.index > committed {
                break;
            }
            in_log.entry(command.client_id).or_default().push(command.data);
        }
        assert_eq!(in_log, expected, "log of node {}", id);

        let applied: Vec<Vec<u8>> = cluster
            .state_machine(id)
            .applied()
            .into_iter()
            .map(|a| a.data)
            .collect();
        assert_eq!(applied.len(), NUM_CLIENTS * COMMANDS_PER_CLIENT, "node {}", id);
    }

    cluster.shutdown().await
}

/// TimeoutNow to the first reachable follower; isolation if the leader
/// refuses or the target does not take over.
async fn change_leader_by_transfer(
    cluster: &MiniCluster,
    old_leader: u32,
) -> u32 {
    let target = cluster
        .reachable_ids()
        .into_iter()
        .find(|id| *id != old_leader)
        .expect("a reachable follower");

    match cluster.transfer(old_leader, target).await {
        Ok(()) => cluster.wait_for_new_leader(old_leader).await,
        Err(e) => {
            warn!("transfer {} -> {} failed: {:?}", old_leader, target, e);
            cluster.change_leader_by_isolation(old_leader).await
        }
    }
}
