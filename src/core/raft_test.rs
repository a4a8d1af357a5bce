use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::time::timeout;

use super::*;
use crate::proto::election::VoteRequest;
use crate::proto::election::VotedFor;
use crate::role_state::RaftRoleState;
use crate::test_utils::mock_context;
use crate::test_utils::test_settings;
use crate::test_utils::unreachable_transport;
use crate::ClientSessions;
use crate::ClusterView;
use crate::MemRaftLog;
use crate::MockStateStorage;
use crate::MockTransport;
use crate::PendingApplies;
use crate::StateStorage;
use crate::StorageError;
use crate::FOLLOWER;
use crate::LEADER;

fn raft_from(
    ctx: RaftContext,
    shutdown_rx: watch::Receiver<()>,
) -> Raft {
    let (event_tx, event_rx) = tokio::sync::mpsc::channel(64);
    Raft::new(ctx, event_tx, event_rx, shutdown_rx).unwrap()
}

async fn wait_for(
    status_rx: &mut watch::Receiver<RaftStatus>,
    condition: impl Fn(&RaftStatus) -> bool,
) -> RaftStatus {
    timeout(Duration::from_secs(3), async {
        loop {
            {
                let status = status_rx.borrow_and_update();
                if condition(&status) {
                    return status.clone();
                }
            }
            status_rx.changed().await.unwrap();
        }
    })
    .await
    .expect("condition not reached in time")
}

#[tokio::test]
async fn test_single_node_elects_itself_and_commits_noop() {
    let m = mock_context(1, &[1], MockTransport::new());
    let state_storage = m.state_storage.clone();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let mut raft = raft_from(m.ctx, shutdown_rx);
    let (commit_tx, mut commit_rx) = tokio::sync::mpsc::unbounded_channel();
    raft.register_new_commit_listener(commit_tx);
    let mut status_rx = raft.subscribe_status();

    let handle = tokio::spawn(async move { raft.run().await });

    let status = wait_for(&mut status_rx, |s| s.role == LEADER && s.commit_index == 1).await;
    assert_eq!(status.current_term, 1);
    assert_eq!(status.leader_id, Some(1));
    assert_eq!(status.last_log_index, 1);
    assert_eq!(commit_rx.recv().await, Some(1));
    assert_eq!(
        state_storage.load_hard_state().unwrap(),
        Some(HardState {
            current_term: 1,
            voted_for: Some(VotedFor {
                voted_for_id: 1,
                voted_for_term: 1
            }),
        })
    );

    shutdown_tx.send(()).unwrap();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_restart_reloads_hard_state() {
    let m = mock_context(1, &[1, 2, 3], unreachable_transport());
    m.state_storage
        .save_hard_state(HardState {
            current_term: 4,
            voted_for: Some(VotedFor {
                voted_for_id: 2,
                voted_for_term: 4,
            }),
        })
        .unwrap();

    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let raft = raft_from(m.ctx, shutdown_rx);

    assert!(raft.role.is_follower());
    assert_eq!(raft.role.current_term(), 4);
    assert_eq!(
        raft.role.state().voted_for(),
        Some(VotedFor {
            voted_for_id: 2,
            voted_for_term: 4
        })
    );
    let status = raft.subscribe_status().borrow().clone();
    assert_eq!(status.role, FOLLOWER);
    assert_eq!(status.current_term, 4);
}

#[tokio::test]
async fn test_vote_request_through_event_loop() {
    let m = mock_context(1, &[1, 2, 3], unreachable_transport());
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let mut raft = raft_from(m.ctx, shutdown_rx);
    let event_tx = raft.event_tx.clone();
    let mut status_rx = raft.subscribe_status();
    let handle = tokio::spawn(async move { raft.run().await });

    let (tx, rx) = oneshot::channel();
    let request = VoteRequest {
        term: 50,
        candidate_id: 2,
        last_log_index: 0,
        last_log_term: 0,
    };
    event_tx.send(RaftEvent::ReceiveVoteRequest(request, tx)).await.unwrap();

    let response = rx.await.unwrap().unwrap();
    assert!(response.vote_granted);
    assert_eq!(response.term, 50);
    wait_for(&mut status_rx, |s| s.current_term >= 50).await;

    shutdown_tx.send(()).unwrap();
    assert!(handle.await.unwrap().is_ok());
}

/// A node that cannot persist its vote stops instead of campaigning
#[tokio::test]
async fn test_persist_failure_stops_the_loop() {
    let settings = Arc::new(test_settings(1, &[1, 2, 3]));
    let mut storage = MockStateStorage::new();
    storage.expect_load_hard_state().returning(|| Ok(None));
    storage
        .expect_save_hard_state()
        .returning(|_| Err(StorageError::StateStorage("read-only filesystem".to_string()).into()));
    storage.expect_flush().returning(|| Ok(()));

    let ctx = RaftContext::new(
        1,
        Arc::new(MemRaftLog::new()),
        Arc::new(storage),
        Arc::new(unreachable_transport()),
        Arc::new(ClusterView::from_config(&settings.cluster)),
        Arc::new(PendingApplies::new()),
        Arc::new(ClientSessions::default()),
        Arc::new(AtomicU64::new(0)),
        settings,
    );
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let mut raft = raft_from(ctx, shutdown_rx);

    let result = timeout(Duration::from_secs(3), raft.run())
        .await
        .expect("loop should stop on its own");

    assert!(result.unwrap_err().is_fatal());
}
