#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use quorum_engine::proto::common::ClientCommand;
use quorum_engine::proto::common::Entry;
use quorum_engine::BackoffPolicy;
use quorum_engine::ClientConfig;
use quorum_engine::ClusterConfig;
use quorum_engine::LocalNetwork;
use quorum_engine::MemRaftLog;
use quorum_engine::MemStateMachine;
use quorum_engine::MemStateStorage;
use quorum_engine::Node;
use quorum_engine::NodeBuilder;
use quorum_engine::NodeHandle;
use quorum_engine::RaftClient;
use quorum_engine::RaftClientBuilder;
use quorum_engine::RaftNodeConfig;
use quorum_engine::RaftStatus;
use quorum_engine::Result;
use quorum_engine::LEADER;
use tokio::time::sleep;
use tokio::time::Instant;
use tracing::info;

pub const HEARTBEAT_MS: u64 = 20;
pub const ELECTION_TIMEOUT_MIN_MS: u64 = 100;
pub const ELECTION_TIMEOUT_MAX_MS: u64 = 200;

/// A leader must appear this soon after the previous one dies: two
/// election timeouts plus scheduling slack for split votes.
pub const ELECTION_BOUND: Duration = Duration::from_millis(ELECTION_TIMEOUT_MAX_MS * 2 + 1000);

/// Upper bound for any single convergence step (an election, a catch-up)
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Config shared by every member, timers shortened for tests
pub fn cluster_config(ids: &[u32]) -> RaftNodeConfig {
    let mut config = RaftNodeConfig {
        cluster: ClusterConfig::default().with_members(ids),
        ..Default::default()
    };
    config.cluster.node_id = ids[0];
    config.raft.replication.rpc_append_entries_clock_in_ms = HEARTBEAT_MS;
    config.raft.election.election_timeout_min = ELECTION_TIMEOUT_MIN_MS;
    config.raft.election.election_timeout_max = ELECTION_TIMEOUT_MAX_MS;
    config.raft.leadership_transfer.timeout_ms = 1000;
    config.raft.commit_handler.process_interval_ms = 10;
    config.retry.append_entries.timeout_ms = 100;
    config.retry.election.timeout_ms = 100;
    config
}

/// Durable state of one member. Survives kill and restart; the state
/// machine is replaced on restart unless asked to keep it.
struct MemberStorage {
    raft_log: Arc<MemRaftLog>,
    state_storage: Arc<MemStateStorage>,
    state_machine: Arc<MemStateMachine>,
}

/// An in-process cluster over [`LocalNetwork`] and in-memory storage.
pub struct MiniCluster {
    pub network: Arc<LocalNetwork>,
    config: RaftNodeConfig,
    ids: Vec<u32>,
    storages: BTreeMap<u32, MemberStorage>,
    nodes: BTreeMap<u32, Node>,
}

impl MiniCluster {
    pub fn new(size: u32) -> Self {
        let ids: Vec<u32> = (1..=size).collect();
        let storages = ids
            .iter()
            .map(|id| {
                (
                    *id,
                    MemberStorage {
                        raft_log: Arc::new(MemRaftLog::new()),
                        state_storage: Arc::new(MemStateStorage::new()),
                        state_machine: Arc::new(MemStateMachine::new()),
                    },
                )
            })
            .collect();

        Self {
            network: LocalNetwork::new(),
            config: cluster_config(&ids),
            ids,
            storages,
            nodes: BTreeMap::new(),
        }
    }

    /// Builds and starts a cluster of `size` members
    pub fn start(size: u32) -> Result<Self> {
        let mut cluster = Self::new(size);
        for id in cluster.ids.clone() {
            cluster.start_node(id)?;
        }
        Ok(cluster)
    }

    pub fn ids(&self) -> Vec<u32> {
        self.ids.clone()
    }

    /// Starts (or restarts) `id` over its kept storage and a fresh state
    /// machine
    pub fn start_node(
        &mut self,
        id: u32,
    ) -> Result<()> {
        self.start_member(id, true)
    }

    /// Restart whose state machine keeps what it applied before the kill
    pub fn restart_keeping_state_machine(
        &mut self,
        id: u32,
    ) -> Result<()> {
        self.start_member(id, false)
    }

    fn start_member(
        &mut self,
        id: u32,
        fresh_state_machine: bool,
    ) -> Result<()> {
        assert!(!self.nodes.contains_key(&id), "node {} is already running", id);
        let storage = self.storages.get_mut(&id).expect("unknown member");
        if fresh_state_machine {
            storage.state_machine = Arc::new(MemStateMachine::new());
        }

        let node = NodeBuilder::new(self.config.for_node(id))
            .raft_log(storage.raft_log.clone())
            .state_storage(storage.state_storage.clone())
            .state_machine(storage.state_machine.clone())
            .transport(Arc::new(self.network.transport(id)))
            .start()?;
        self.network.register(node.handle());
        self.nodes.insert(id, node);
        info!("started node {}", id);
        Ok(())
    }

    pub fn restart(
        &mut self,
        id: u32,
    ) -> Result<()> {
        self.start_node(id)
    }

    /// Simulated crash: the node drops off the network, its storage stays
    pub async fn kill(
        &mut self,
        id: u32,
    ) {
        self.network.unregister(id);
        if let Some(node) = self.nodes.remove(&id) {
            node.kill().await;
        }
        info!("killed node {}", id);
    }

    /// Graceful stop of every running node
    pub async fn shutdown(mut self) -> Result<()> {
        let nodes = std::mem::take(&mut self.nodes);
        for (id, node) in nodes {
            self.network.unregister(id);
            node.shutdown().await?;
        }
        Ok(())
    }

    /// Drops every request `id` sends and every reply it gives
    pub fn isolate(
        &self,
        id: u32,
    ) {
        self.network.block_outbound(id);
    }

    pub fn reconnect(
        &self,
        id: u32,
    ) {
        self.network.unblock_outbound(id);
    }

    pub fn is_running(
        &self,
        id: u32,
    ) -> bool {
        self.nodes.get(&id).map(|n| n.is_running()).unwrap_or(false)
    }

    pub fn alive_ids(&self) -> Vec<u32> {
        self.nodes.keys().copied().collect()
    }

    /// Running and not isolated
    pub fn reachable_ids(&self) -> Vec<u32> {
        self.alive_ids()
            .into_iter()
            .filter(|id| !self.network.is_blocked(*id))
            .collect()
    }

    pub fn handle(
        &self,
        id: u32,
    ) -> NodeHandle {
        self.nodes.get(&id).expect("node is not running").handle()
    }

    pub fn status(
        &self,
        id: u32,
    ) -> RaftStatus {
        self.handle(id).status()
    }

    pub fn log(
        &self,
        id: u32,
    ) -> Vec<Entry> {
        self.storages[&id].raft_log.snapshot()
    }

    /// Client commands in log order, noops skipped
    pub fn commands(
        &self,
        id: u32,
    ) -> Vec<(Entry, ClientCommand)> {
        self.log(id)
            .into_iter()
            .filter_map(|e| e.client_command().cloned().map(|c| (e, c)))
            .collect()
    }

    pub fn state_machine(
        &self,
        id: u32,
    ) -> Arc<MemStateMachine> {
        self.storages[&id].state_machine.clone()
    }

    /// The leader of the highest term among reachable nodes, if exactly one
    /// reachable node claims it.
    pub fn leader(&self) -> Option<u32> {
        let statuses: Vec<RaftStatus> = self.reachable_ids().into_iter().map(|id| self.status(id)).collect();
        let max_term = statuses.iter().map(|s| s.current_term).max()?;
        let leaders: Vec<u32> = statuses
            .iter()
            .filter(|s| s.role == LEADER && s.current_term == max_term)
            .map(|s| s.node_id)
            .collect();
        match leaders.as_slice() {
            [leader] => Some(*leader),
            _ => None,
        }
    }

    pub async fn wait_for_leader(&self) -> u32 {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        loop {
            if let Some(leader) = self.leader() {
                return leader;
            }
            assert!(
                Instant::now() < deadline,
                "no leader elected among {:?}",
                self.reachable_ids()
            );
            sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn wait_for_new_leader(
        &self,
        old_leader: u32,
    ) -> u32 {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        loop {
            if let Some(leader) = self.leader() {
                if leader != old_leader {
                    return leader;
                }
            }
            assert!(Instant::now() < deadline, "leadership never left node {}", old_leader);
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Asserts that no reachable node becomes leader within `window`
    pub async fn assert_no_leader(
        &self,
        window: Duration,
    ) {
        let deadline = Instant::now() + window;
        while Instant::now() < deadline {
            let leaders: Vec<u32> = self
                .reachable_ids()
                .into_iter()
                .filter(|id| self.status(*id).role == LEADER)
                .collect();
            assert!(leaders.is_empty(), "unexpected leader(s) {:?}", leaders);
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Cooperative transfer from the current leader `from` to `to`
    pub async fn transfer(
        &self,
        from: u32,
        to: u32,
    ) -> Result<()> {
        self.handle(from)
            .transfer_leadership(to, Duration::from_millis(2000))
            .await
    }

    /// Forces a new leader by isolating the current one, then lets the old
    /// leader back in once someone else leads.
    pub async fn change_leader_by_isolation(
        &self,
        old_leader: u32,
    ) -> u32 {
        self.isolate(old_leader);
        let new_leader = self.wait_for_new_leader(old_leader).await;
        self.reconnect(old_leader);
        new_leader
    }

    /// Polls `condition` until it holds or [`WAIT_TIMEOUT`] passes
    pub async fn wait_until<F>(
        &self,
        what: &str,
        mut condition: F,
    ) where
        F: FnMut(&Self) -> bool,
    {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while !condition(self) {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Every reachable node applied at least up to `index`
    pub async fn wait_applied(
        &self,
        index: u64,
    ) {
        self.wait_until(&format!("index {} applied everywhere", index), |c| {
            c.reachable_ids().into_iter().all(|id| c.status(id).last_applied >= index)
        })
        .await
    }

    pub fn client(&self) -> Result<RaftClient> {
        RaftClientBuilder::new(self.ids.clone(), self.network.clone())
            .set_config(client_config())
            .build()
    }
}

/// Retries without an attempt budget; only the deadline stops a client.
pub fn client_config() -> ClientConfig {
    ClientConfig {
        request_timeout: Duration::from_millis(1000),
        overall_timeout: Duration::from_secs(60),
        retry: BackoffPolicy {
            max_retries: 0,
            timeout_ms: 1000,
            base_delay_ms: 10,
            max_delay_ms: 100,
        },
    }
}

/// Runs `f` under a deadline, failing the test on expiry
pub async fn within<F, T>(
    what: &str,
    limit: Duration,
    f: F,
) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(limit, f).await {
        Ok(v) => v,
        Err(_) => panic!("{} did not finish within {:?}", what, limit),
    }
}
