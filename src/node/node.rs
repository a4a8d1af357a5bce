use std::sync::Arc;
use std::time::Duration;

use nanoid::nanoid;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::proto::client::ClientRequest;
use crate::proto::client::ClientResponse;
use crate::proto::election::TimeoutNowRequest;
use crate::proto::election::TimeoutNowResponse;
use crate::proto::election::VoteRequest;
use crate::proto::election::VoteResponse;
use crate::proto::replication::AppendEntriesRequest;
use crate::proto::replication::AppendEntriesResponse;
use crate::ClientApiError;
use crate::ClientProposal;
use crate::NetworkError;
use crate::PendingApplies;
use crate::RaftEvent;
use crate::RaftLog;
use crate::RaftStatus;
use crate::Result;
use crate::StateMachine;
use crate::StateStorage;

/// Entry point into a running node's event loop.
///
/// Every call turns into a [`RaftEvent`] carrying a oneshot for the answer,
/// so nothing here touches node state directly.
#[derive(Clone)]
pub struct NodeHandle {
    node_id: u32,
    event_tx: mpsc::Sender<RaftEvent>,
    pending: Arc<PendingApplies>,
    status_rx: watch::Receiver<RaftStatus>,
}

impl NodeHandle {
    pub(crate) fn new(
        node_id: u32,
        event_tx: mpsc::Sender<RaftEvent>,
        pending: Arc<PendingApplies>,
        status_rx: watch::Receiver<RaftStatus>,
    ) -> Self {
        Self {
            node_id,
            event_tx,
            pending,
            status_rx,
        }
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// Latest status published by the event loop
    pub fn status(&self) -> RaftStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RaftStatus> {
        self.status_rx.clone()
    }

    /// Proposes `request` and waits until it is applied, redirected or
    /// `wait` runs out.
    ///
    /// On timeout the wait registration is withdrawn, so a commit that
    /// lands afterwards is not delivered to anyone.
    pub async fn submit(
        &self,
        request: ClientRequest,
        wait: Duration,
    ) -> std::result::Result<ClientResponse, ClientApiError> {
        let node_id = self.node_id;
        let request_id = nanoid!();
        let (resp_tx, resp_rx) = oneshot::channel();
        let proposal = ClientProposal {
            request,
            request_id: request_id.clone(),
        };

        let round_trip = async {
            self.event_tx
                .send(RaftEvent::ClientPropose(proposal, resp_tx))
                .await
                .map_err(|_| ClientApiError::Unavailable { node_id })?;
            resp_rx.await.map_err(|_| ClientApiError::Unavailable { node_id })
        };

        match timeout(wait, round_trip).await {
            Ok(result) => result,
            Err(_) => {
                if self.pending.cancel(&request_id).is_some() {
                    debug!("[{}] request {} abandoned after {:?}", node_id, request_id, wait);
                }
                Err(ClientApiError::Timeout)
            }
        }
    }

    /// Asks the leader to hand leadership to `target`. Returns once the
    /// target accepted TimeoutNow, not when it won its election.
    pub async fn transfer_leadership(
        &self,
        target: u32,
        wait: Duration,
    ) -> Result<()> {
        let node_id = self.node_id;
        let (resp_tx, resp_rx) = oneshot::channel();
        self.event_tx
            .send(RaftEvent::TransferLeadership(target, resp_tx))
            .await
            .map_err(|_| NetworkError::NodeUnavailable { node_id })?;

        match timeout(wait, resp_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(NetworkError::NodeUnavailable { node_id }.into()),
            Err(_) => Err(NetworkError::Timeout {
                node_id,
                duration: wait,
            }
            .into()),
        }
    }

    pub async fn deliver_vote_request(
        &self,
        request: VoteRequest,
    ) -> Result<VoteResponse> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.deliver(RaftEvent::ReceiveVoteRequest(request, resp_tx), resp_rx).await
    }

    pub async fn deliver_append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.deliver(RaftEvent::AppendEntries(request, resp_tx), resp_rx).await
    }

    pub async fn deliver_timeout_now(
        &self,
        request: TimeoutNowRequest,
    ) -> Result<TimeoutNowResponse> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.deliver(RaftEvent::TimeoutNow(request, resp_tx), resp_rx).await
    }

    async fn deliver<T>(
        &self,
        event: RaftEvent,
        resp_rx: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        let node_id = self.node_id;
        self.event_tx
            .send(event)
            .await
            .map_err(|_| NetworkError::NodeUnavailable { node_id })?;
        resp_rx.await.map_err(|_| NetworkError::NodeUnavailable { node_id })?
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("NodeHandle").field("node_id", &self.node_id).finish()
    }
}

/// A started node: its two background tasks and the storage they work on.
///
/// Storage handles outlive the node, so a node rebuilt over them after
/// [`Node::kill`] or [`Node::shutdown`] reloads its term, vote and log.
pub struct Node {
    pub(super) handle: NodeHandle,
    pub(super) raft_task: JoinHandle<Result<()>>,
    pub(super) commit_task: JoinHandle<Result<()>>,
    pub(super) shutdown_tx: watch::Sender<()>,

    pub(super) raft_log: Arc<dyn RaftLog>,
    pub(super) state_storage: Arc<dyn StateStorage>,
    pub(super) state_machine: Arc<dyn StateMachine>,
}

impl Node {
    pub fn node_id(&self) -> u32 {
        self.handle.node_id()
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }

    pub fn raft_log(&self) -> Arc<dyn RaftLog> {
        self.raft_log.clone()
    }

    pub fn state_storage(&self) -> Arc<dyn StateStorage> {
        self.state_storage.clone()
    }

    pub fn state_machine(&self) -> Arc<dyn StateMachine> {
        self.state_machine.clone()
    }

    /// False once the event loop stopped, e.g. after a fatal storage error
    pub fn is_running(&self) -> bool {
        !self.raft_task.is_finished()
    }

    /// Graceful stop: both loops see the signal, flush and exit.
    ///
    /// Returns the error the event loop stopped with, if any.
    pub async fn shutdown(self) -> Result<()> {
        let node_id = self.node_id();
        info!("[Node:{}] shutting down", node_id);
        if self.shutdown_tx.send(()).is_err() {
            debug!("[Node:{}] both loops already stopped", node_id);
        }

        let raft_result = self.raft_task.await.map_err(NetworkError::TaskFailed)?;
        let commit_result = self.commit_task.await.map_err(NetworkError::TaskFailed)?;
        raft_result.and(commit_result)
    }

    /// Simulated crash: tasks are aborted mid-flight, nothing is flushed
    /// beyond what each write already made durable.
    pub async fn kill(self) {
        let node_id = self.node_id();
        warn!("[Node:{}] killed", node_id);
        self.raft_task.abort();
        self.commit_task.abort();
        // wait for the abort so nothing touches storage after we return
        let _ = self.raft_task.await;
        let _ = self.commit_task.await;
    }
}

impl std::fmt::Debug for Node {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id())
            .field("running", &self.is_running())
            .finish()
    }
}
