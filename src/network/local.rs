//! In-process network.
//!
//! Every node of a cluster running in one process registers its
//! [`NodeHandle`] here. Requests are routed straight into the target's
//! event channel. Killing a node means unregistering it; isolating a node
//! means blocking its outbound traffic, which drops both the requests it
//! sends and the replies it gives.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::DashSet;
use tracing::debug;
use tracing::info;
use tracing::trace;

use super::ClientTransport;
use super::Transport;
use crate::proto::client::ClientRequest;
use crate::proto::client::ClientResponse;
use crate::proto::election::TimeoutNowRequest;
use crate::proto::election::TimeoutNowResponse;
use crate::proto::election::VoteRequest;
use crate::proto::election::VoteResponse;
use crate::proto::replication::AppendEntriesRequest;
use crate::proto::replication::AppendEntriesResponse;
use crate::ClientApiError;
use crate::NetworkError;
use crate::NodeHandle;
use crate::Result;

#[derive(Default)]
pub struct LocalNetwork {
    nodes: DashMap<u32, NodeHandle>,
    /// Nodes whose outbound traffic is dropped
    blocked: DashSet<u32>,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes `handle` reachable. Replaces an earlier registration of the
    /// same node, which is how a restarted node comes back.
    pub fn register(
        &self,
        handle: NodeHandle,
    ) {
        info!("node {} joined the local network", handle.node_id());
        self.nodes.insert(handle.node_id(), handle);
    }

    pub fn unregister(
        &self,
        node_id: u32,
    ) {
        info!("node {} left the local network", node_id);
        self.nodes.remove(&node_id);
    }

    pub fn block_outbound(
        &self,
        node_id: u32,
    ) {
        info!("block outbound traffic of node {}", node_id);
        self.blocked.insert(node_id);
    }

    pub fn unblock_outbound(
        &self,
        node_id: u32,
    ) {
        info!("unblock outbound traffic of node {}", node_id);
        self.blocked.remove(&node_id);
    }

    pub fn is_blocked(
        &self,
        node_id: u32,
    ) -> bool {
        self.blocked.contains(&node_id)
    }

    pub fn is_registered(
        &self,
        node_id: u32,
    ) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Peer transport used by node `node_id`
    pub fn transport(
        self: &Arc<Self>,
        node_id: u32,
    ) -> LocalTransport {
        LocalTransport {
            my_id: node_id,
            network: self.clone(),
        }
    }

    fn route(
        &self,
        from: u32,
        to: u32,
    ) -> Result<NodeHandle> {
        if self.is_blocked(from) {
            trace!("drop request {} -> {}", from, to);
            return Err(NetworkError::RequestBlocked { from, to }.into());
        }
        // clone out of the map: never hold a shard lock across an await
        self.nodes
            .get(&to)
            .map(|h| h.clone())
            .ok_or_else(|| NetworkError::NodeUnavailable { node_id: to }.into())
    }

    /// A reply travels back on the receiver's outbound path
    fn check_reply(
        &self,
        from: u32,
        to: u32,
    ) -> Result<()> {
        if self.is_blocked(to) {
            trace!("drop reply {} -> {}", to, from);
            return Err(NetworkError::RequestBlocked { from: to, to: from }.into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for LocalNetwork {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let mut nodes: Vec<u32> = self.nodes.iter().map(|e| *e.key()).collect();
        nodes.sort_unstable();
        let mut blocked: Vec<u32> = self.blocked.iter().map(|e| *e).collect();
        blocked.sort_unstable();
        f.debug_struct("LocalNetwork")
            .field("nodes", &nodes)
            .field("blocked", &blocked)
            .finish()
    }
}

/// One node's view of the [`LocalNetwork`]
#[derive(Clone, Debug)]
pub struct LocalTransport {
    my_id: u32,
    network: Arc<LocalNetwork>,
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send_vote_request(
        &self,
        to: u32,
        request: VoteRequest,
    ) -> Result<VoteResponse> {
        let target = self.network.route(self.my_id, to)?;
        let response = target.deliver_vote_request(request).await?;
        self.network.check_reply(self.my_id, to)?;
        Ok(response)
    }

    async fn send_append_entries(
        &self,
        to: u32,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        let target = self.network.route(self.my_id, to)?;
        let response = target.deliver_append_entries(request).await?;
        self.network.check_reply(self.my_id, to)?;
        Ok(response)
    }

    async fn send_timeout_now(
        &self,
        to: u32,
        request: TimeoutNowRequest,
    ) -> Result<TimeoutNowResponse> {
        let target = self.network.route(self.my_id, to)?;
        let response = target.deliver_timeout_now(request).await?;
        self.network.check_reply(self.my_id, to)?;
        Ok(response)
    }
}

#[async_trait]
impl ClientTransport for LocalNetwork {
    async fn propose(
        &self,
        node_id: u32,
        request: ClientRequest,
        timeout: Duration,
    ) -> std::result::Result<ClientResponse, ClientApiError> {
        if self.is_blocked(node_id) {
            debug!("client request to isolated node {}", node_id);
            return Err(ClientApiError::Unavailable { node_id });
        }
        let target = self
            .nodes
            .get(&node_id)
            .map(|h| h.clone())
            .ok_or(ClientApiError::Unavailable { node_id })?;
        target.submit(request, timeout).await
    }
}
