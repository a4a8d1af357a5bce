//! A retry reaching a restarted node whose state machine kept its state.
//!
//! Scenario:
//!
//! 1. Start a single node and commit `(a, 1)`.
//! 2. Kill it, restart it over the same log, term store and state machine.
//! 3. Send `(a, 1)` again, then `(a, 2)`.
//!
//! Expected Result:
//!
//! - The retry is answered with the original commit result.
//! - The state machine applied `(a, 1)` once and `(a, 2)` once.

use std::time::Duration;

use quorum_engine::proto::client::ClientRequest;
use quorum_engine::proto::client::ClientResponse;
use quorum_engine::Result;
use tracing_test::traced_test;

use crate::common::MiniCluster;

fn request(sequence: u64) -> ClientRequest {
    ClientRequest {
        client_id: "a".to_string(),
        sequence,
        command: format!("a-{}", sequence).into_bytes(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[traced_test]
async fn test_retry_after_restart_is_not_reapplied() -> Result<()> {
    let mut cluster = MiniCluster::start(1)?;
    let node = cluster.wait_for_leader().await;

    let first = cluster
        .handle(node)
        .submit(request(1), Duration::from_secs(2))
        .await
        .expect("first submit");
    let ClientResponse::Committed(committed) = first else {
        panic!("expected a commit, got {:?}", first);
    };
    cluster.wait_applied(committed.index).await;

    cluster.kill(node).await;
    cluster.restart_keeping_state_machine(node)?;
    cluster.wait_for_leader().await;

    let retry = cluster
        .handle(node)
        .submit(request(1), Duration::from_secs(2))
        .await
        .expect("retry");
    assert_eq!(retry, ClientResponse::Committed(committed.clone()));

    let next = cluster
        .handle(node)
        .submit(request(2), Duration::from_secs(2))
        .await
        .expect("next sequence");
    let ClientResponse::Committed(next) = next else {
        panic!("expected a commit, got {:?}", next);
    };
    assert!(next.index > committed.index);
    cluster.wait_applied(next.index).await;

    let applied: Vec<Vec<u8>> = cluster
        .state_machine(node)
        .applied()
        .into_iter()
        .map(|a| a.data)
        .collect();
    assert_eq!(applied, vec![b"a-1".to_vec(), b"a-2".to_vec()]);

    cluster.shutdown().await
}
