use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::ClientSessions;
use crate::ClusterView;
use crate::ElectionHandler;
use crate::PendingApplies;
use crate::RaftLog;
use crate::RaftNodeConfig;
use crate::ReplicationHandler;
use crate::StateStorage;
use crate::Transport;

/// Everything a role needs besides its own state: storage, network,
/// membership, the protocol handlers and the structures shared with the
/// apply loop.
pub struct RaftContext {
    pub(crate) node_id: u32,

    // Storages
    pub(crate) raft_log: Arc<dyn RaftLog>,
    pub(crate) state_storage: Arc<dyn StateStorage>,

    // Network
    pub(crate) transport: Arc<dyn Transport>,

    // Cluster Membership
    pub(crate) cluster: Arc<ClusterView>,

    // Handlers
    pub(crate) election_handler: ElectionHandler,
    pub(crate) replication_handler: ReplicationHandler,

    // Shared with the apply loop
    pub(crate) pending: Arc<PendingApplies>,
    pub(crate) sessions: Arc<ClientSessions>,
    pub(crate) last_applied: Arc<AtomicU64>,

    pub(crate) settings: Arc<RaftNodeConfig>,
}

impl RaftContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        node_id: u32,
        raft_log: Arc<dyn RaftLog>,
        state_storage: Arc<dyn StateStorage>,
        transport: Arc<dyn Transport>,
        cluster: Arc<ClusterView>,
        pending: Arc<PendingApplies>,
        sessions: Arc<ClientSessions>,
        last_applied: Arc<AtomicU64>,
        settings: Arc<RaftNodeConfig>,
    ) -> Self {
        Self {
            node_id,
            raft_log,
            state_storage,
            transport,
            cluster,
            election_handler: ElectionHandler::new(node_id),
            replication_handler: ReplicationHandler::new(node_id),
            pending,
            sessions,
            last_applied,
            settings,
        }
    }

    pub fn raft_log(&self) -> &Arc<dyn RaftLog> {
        &self.raft_log
    }

    pub fn state_storage(&self) -> &Arc<dyn StateStorage> {
        &self.state_storage
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn cluster(&self) -> &Arc<ClusterView> {
        &self.cluster
    }

    pub fn election_handler(&self) -> &ElectionHandler {
        &self.election_handler
    }

    pub fn replication_handler(&self) -> &ReplicationHandler {
        &self.replication_handler
    }

    pub fn settings(&self) -> Arc<RaftNodeConfig> {
        self.settings.clone()
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied.load(Ordering::Acquire)
    }
}
