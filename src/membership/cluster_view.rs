use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use tracing::debug;

use crate::cluster::majority_count;
use crate::ClusterConfig;
use crate::NodeMeta;

/// Fixed membership as seen from one node, plus that node's best guess of
/// the current leader.
#[derive(Debug)]
pub struct ClusterView {
    node_id: u32,
    members: Vec<NodeMeta>,
    // 0 means unknown; node ids start at 1
    current_leader: AtomicU32,
}

impl ClusterView {
    pub fn new(
        node_id: u32,
        members: Vec<NodeMeta>,
    ) -> Self {
        Self {
            node_id,
            members,
            current_leader: AtomicU32::new(0),
        }
    }

    pub fn from_config(config: &ClusterConfig) -> Self {
        Self::new(config.node_id, config.initial_cluster.clone())
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// All nodes (including itself)
    pub fn members(&self) -> &[NodeMeta] {
        &self.members
    }

    pub fn member_ids(&self) -> Vec<u32> {
        self.members.iter().map(|n| n.id).collect()
    }

    /// All non-self nodes
    pub fn peer_ids(&self) -> Vec<u32> {
        self.members.iter().map(|n| n.id).filter(|id| *id != self.node_id).collect()
    }

    pub fn contains(
        &self,
        node_id: u32,
    ) -> bool {
        self.members.iter().any(|n| n.id == node_id)
    }

    pub fn voter_count(&self) -> usize {
        self.members.len()
    }

    /// ⌊N/2⌋ + 1
    pub fn quorum(&self) -> usize {
        majority_count(self.members.len())
    }

    pub fn mark_leader_id(
        &self,
        leader_id: u32,
    ) {
        let old = self.current_leader.swap(leader_id, Ordering::AcqRel);
        if old != leader_id {
            debug!("[{}] leader changed {} -> {}", self.node_id, old, leader_id);
        }
    }

    pub fn current_leader_id(&self) -> Option<u32> {
        match self.current_leader.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    pub fn reset_leader(&self) {
        self.current_leader.store(0, Ordering::Release);
    }
}
