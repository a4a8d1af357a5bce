//! Assembles and starts a [`Node`].
//!
//! Components that are not set explicitly get defaults: sled storage under
//! `db_root_dir/<node_id>` and an in-memory state machine. The transport has
//! no default.
//!
//! ## Example
//! ```ignore
//! let network = LocalNetwork::new();
//! let node = NodeBuilder::new(config.for_node(1))
//!     .transport(Arc::new(network.transport(1)))
//!     .start()?;
//! network.register(node.handle());
//! ```

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::error;
use tracing::info;

use super::Node;
use super::NodeHandle;
use crate::init_sled_storages;
use crate::ClientSessions;
use crate::ClusterView;
use crate::CommitHandler;
use crate::DefaultCommitHandler;
use crate::MemStateMachine;
use crate::PendingApplies;
use crate::Raft;
use crate::RaftContext;
use crate::RaftLog;
use crate::RaftNodeConfig;
use crate::Result;
use crate::StateMachine;
use crate::StateStorage;
use crate::SystemError;
use crate::Transport;
use crate::DEFAULT_SESSION_WINDOW;
use crate::EVENT_CHANNEL_CAPACITY;

pub struct NodeBuilder {
    node_config: RaftNodeConfig,
    raft_log: Option<Arc<dyn RaftLog>>,
    state_storage: Option<Arc<dyn StateStorage>>,
    state_machine: Option<Arc<dyn StateMachine>>,
    transport: Option<Arc<dyn Transport>>,
}

impl NodeBuilder {
    pub fn new(node_config: RaftNodeConfig) -> Self {
        Self {
            node_config,
            raft_log: None,
            state_storage: None,
            state_machine: None,
            transport: None,
        }
    }

    /// Sets a custom Raft log storage implementation
    pub fn raft_log(
        mut self,
        raft_log: Arc<dyn RaftLog>,
    ) -> Self {
        self.raft_log = Some(raft_log);
        self
    }

    /// Sets a custom term/vote storage implementation
    pub fn state_storage(
        mut self,
        state_storage: Arc<dyn StateStorage>,
    ) -> Self {
        self.state_storage = Some(state_storage);
        self
    }

    pub fn state_machine(
        mut self,
        state_machine: Arc<dyn StateMachine>,
    ) -> Self {
        self.state_machine = Some(state_machine);
        self
    }

    pub fn transport(
        mut self,
        transport: Arc<dyn Transport>,
    ) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validates the configuration, reloads durable state and spawns the
    /// event loop and the apply loop. Must run inside a tokio runtime.
    pub fn start(self) -> Result<Node> {
        let node_config = self.node_config.validate()?;
        let node_id = node_config.cluster.node_id;

        let transport = self.transport.ok_or_else(|| {
            SystemError::NodeStartFailed(format!("node {} has no transport configured", node_id))
        })?;

        let (raft_log, state_storage) = match (self.raft_log, self.state_storage) {
            (Some(raft_log), Some(state_storage)) => (raft_log, state_storage),
            (raft_log, state_storage) => {
                let db_dir = node_config.cluster.node_db_dir();
                info!("[Node:{}] open sled storage at {:?}", node_id, db_dir);
                let (sled_log, sled_state) = init_sled_storages(db_dir)?;
                (
                    raft_log.unwrap_or_else(|| Arc::new(sled_log)),
                    state_storage.unwrap_or_else(|| Arc::new(sled_state)),
                )
            }
        };
        let state_machine = self
            .state_machine
            .unwrap_or_else(|| Arc::new(MemStateMachine::new()));

        let applied_index = state_machine.last_applied();
        let sessions = Arc::new(ClientSessions::rebuild(
            DEFAULT_SESSION_WINDOW,
            raft_log.as_ref(),
            state_machine.as_ref(),
            applied_index,
        )?);
        let last_applied = Arc::new(AtomicU64::new(applied_index));
        let pending = Arc::new(PendingApplies::new());
        let settings = Arc::new(node_config);

        let ctx = RaftContext::new(
            node_id,
            raft_log.clone(),
            state_storage.clone(),
            transport,
            Arc::new(ClusterView::from_config(&settings.cluster)),
            pending.clone(),
            sessions.clone(),
            last_applied.clone(),
            settings.clone(),
        );

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let (new_commit_tx, new_commit_rx) = mpsc::unbounded_channel();

        let mut raft = Raft::new(ctx, event_tx.clone(), event_rx, shutdown_rx.clone())?;
        raft.register_new_commit_listener(new_commit_tx);
        let status_rx = raft.subscribe_status();

        let mut commit_handler = DefaultCommitHandler::new(
            node_id,
            raft_log.clone(),
            state_machine.clone(),
            sessions,
            pending.clone(),
            last_applied,
            new_commit_rx,
            settings.raft.commit_handler.batch_size,
            settings.raft.commit_handler.process_interval_ms,
            shutdown_rx,
        );

        let raft_task = tokio::spawn(async move {
            let result = raft.run().await;
            match &result {
                Ok(()) => info!("[Node:{}] raft loop stopped", node_id),
                Err(e) => error!("[Node:{}] raft loop stopped with error: {:?}", node_id, e),
            }
            result
        });
        let commit_task = tokio::spawn(async move {
            let result = commit_handler.run().await;
            match &result {
                Ok(()) => info!("[Node:{}] commit handler stopped", node_id),
                Err(e) => error!("[Node:{}] commit handler stopped with error: {:?}", node_id, e),
            }
            result
        });

        info!("[Node:{}] started", node_id);
        Ok(Node {
            handle: NodeHandle::new(node_id, event_tx, pending, status_rx),
            raft_task,
            commit_task,
            shutdown_tx,
            raft_log,
            state_storage,
            state_machine,
        })
    }
}
