use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::ClientSessions;
use crate::ClusterConfig;
use crate::ClusterView;
use crate::MemRaftLog;
use crate::MemStateStorage;
use crate::MockTransport;
use crate::PendingApplies;
use crate::RaftContext;
use crate::RaftEvent;
use crate::RaftNodeConfig;
use crate::RoleEvent;
use crate::Transport;

/// Settings with timers short enough for unit tests
pub fn test_settings(
    node_id: u32,
    members: &[u32],
) -> RaftNodeConfig {
    let mut config = RaftNodeConfig {
        cluster: ClusterConfig::default().with_members(members),
        ..Default::default()
    };
    config.cluster.node_id = node_id;
    config.raft.replication.rpc_append_entries_clock_in_ms = 20;
    config.raft.election.election_timeout_min = 100;
    config.raft.election.election_timeout_max = 200;
    config.raft.leadership_transfer.timeout_ms = 500;
    config.retry.append_entries.timeout_ms = 50;
    config.retry.election.timeout_ms = 50;
    config
}

/// Everything a role test needs, backed by in-memory storage
pub struct MockContext {
    pub ctx: RaftContext,
    pub raft_log: Arc<MemRaftLog>,
    pub state_storage: Arc<MemStateStorage>,
    pub role_tx: mpsc::UnboundedSender<RoleEvent>,
    pub role_rx: mpsc::UnboundedReceiver<RoleEvent>,
    pub event_tx: mpsc::Sender<RaftEvent>,
    pub event_rx: mpsc::Receiver<RaftEvent>,
}

pub fn mock_context(
    node_id: u32,
    members: &[u32],
    transport: MockTransport,
) -> MockContext {
    mock_context_with_transport(node_id, members, Arc::new(transport))
}

pub fn mock_context_with_transport(
    node_id: u32,
    members: &[u32],
    transport: Arc<dyn Transport>,
) -> MockContext {
    let settings = Arc::new(test_settings(node_id, members));
    let raft_log = Arc::new(MemRaftLog::new());
    let state_storage = Arc::new(MemStateStorage::new());
    let cluster = Arc::new(ClusterView::from_config(&settings.cluster));

    let ctx = RaftContext::new(
        node_id,
        raft_log.clone(),
        state_storage.clone(),
        transport,
        cluster,
        Arc::new(PendingApplies::new()),
        Arc::new(ClientSessions::default()),
        Arc::new(AtomicU64::new(0)),
        settings,
    );

    let (role_tx, role_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(64);

    MockContext {
        ctx,
        raft_log,
        state_storage,
        role_tx,
        role_rx,
        event_tx,
        event_rx,
    }
}

/// Transport that fails every request, for tests that only look at local
/// state changes
pub fn unreachable_transport() -> MockTransport {
    let mut transport = MockTransport::new();
    transport
        .expect_send_vote_request()
        .returning(|to, _| Err(crate::NetworkError::NodeUnavailable { node_id: to }.into()));
    transport
        .expect_send_append_entries()
        .returning(|to, _| Err(crate::NetworkError::NodeUnavailable { node_id: to }.into()));
    transport
        .expect_send_timeout_now()
        .returning(|to, _| Err(crate::NetworkError::NodeUnavailable { node_id: to }.into()));
    transport
}

/// Waits until the published status satisfies `condition`
pub async fn wait_for_status(
    mut status_rx: tokio::sync::watch::Receiver<crate::RaftStatus>,
    condition: impl Fn(&crate::RaftStatus) -> bool,
) -> crate::RaftStatus {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            {
                let status = status_rx.borrow_and_update();
                if condition(&status) {
                    return status.clone();
                }
            }
            if status_rx.changed().await.is_err() {
                panic!("node stopped before reaching the expected status");
            }
        }
    })
    .await
    .expect("status not reached in time")
}
