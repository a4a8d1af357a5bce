pub mod candidate_state;
pub mod follower_state;
pub mod leader_state;
pub mod role_state;


use std::sync::Arc;

use candidate_state::CandidateState;
use follower_state::FollowerState;
use leader_state::LeaderState;
use role_state::RaftRoleState;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use super::RaftContext;
use super::RaftEvent;
use super::RoleEvent;
use crate::proto::election::VotedFor;
use crate::RaftNodeConfig;
use crate::Result;
use crate::CANDIDATE;
use crate::FOLLOWER;
use crate::LEADER;

pub enum RaftRole {
    Follower(Box<FollowerState>),
    Candidate(Box<CandidateState>),
    Leader(Box<LeaderState>),
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HardState {
    /// Persistent state on all servers(Updated on stable storage before
    /// responding to RPCs): latest term server has seen (initialized to 0
    /// on first boot, increases monotonically)
    pub current_term: u64,
    /// Persistent state on all servers(Updated on stable storage before
    /// responding to RPCs): candidateId that received vote in current term
    /// (or null if none)
    pub voted_for: Option<VotedFor>,
}

#[derive(Clone, Debug)]
pub struct SharedState {
    pub node_id: u32,

    pub hard_state: HardState,
    /// Volatile state on all servers:
    /// index of highest log entry known to be committed (initialized to 0,
    /// increases monotonically)
    pub commit_index: u64,
}

impl SharedState {
    pub(crate) fn new(
        node_id: u32,
        hard_state_from_db: Option<HardState>,
        commit_index: u64,
    ) -> Self {
        debug!(
            "New Shared State with, hard_state_from_db:{:?}, commit_index:{:?} ",
            &hard_state_from_db, commit_index
        );
        Self {
            node_id,
            hard_state: hard_state_from_db.unwrap_or_default(),
            commit_index,
        }
    }

    pub fn current_term(&self) -> u64 {
        self.hard_state.current_term
    }

    pub fn voted_for(&self) -> Option<VotedFor> {
        self.hard_state.voted_for
    }
}

impl RaftRole {
    /// Every node boots as a follower over whatever hard state it persisted.
    pub(crate) fn initial(
        node_id: u32,
        hard_state: Option<HardState>,
        commit_index: u64,
        settings: Arc<RaftNodeConfig>,
    ) -> Self {
        RaftRole::Follower(Box::new(FollowerState::new(
            SharedState::new(node_id, hard_state, commit_index),
            settings,
        )))
    }

    pub fn state(&self) -> &dyn RaftRoleState {
        match self {
            RaftRole::Follower(state) => state.as_ref(),
            RaftRole::Candidate(state) => state.as_ref(),
            RaftRole::Leader(state) => state.as_ref(),
        }
    }

    pub fn state_mut(&mut self) -> &mut dyn RaftRoleState {
        match self {
            RaftRole::Follower(state) => state.as_mut(),
            RaftRole::Candidate(state) => state.as_mut(),
            RaftRole::Leader(state) => state.as_mut(),
        }
    }

    pub(crate) fn is_timer_expired(&self) -> bool {
        self.state().is_timer_expired()
    }

    pub(crate) fn reset_timer(&mut self) {
        self.state_mut().reset_timer()
    }

    pub fn next_deadline(&self) -> Instant {
        self.state().next_deadline()
    }

    #[inline]
    pub fn as_i32(&self) -> i32 {
        match self {
            RaftRole::Follower(_) => FOLLOWER,
            RaftRole::Candidate(_) => CANDIDATE,
            RaftRole::Leader(_) => LEADER,
        }
    }

    pub fn is_follower(&self) -> bool {
        self.state().is_follower()
    }

    pub fn is_leader(&self) -> bool {
        self.state().is_leader()
    }

    pub fn current_term(&self) -> u64 {
        self.state().current_term()
    }

    pub fn commit_index(&self) -> u64 {
        self.state().commit_index()
    }

    pub(crate) fn become_leader(&self) -> Result<RaftRole> {
        self.state().become_leader()
    }

    pub(crate) fn become_candidate(&self) -> Result<RaftRole> {
        self.state().become_candidate()
    }

    pub(crate) fn become_follower(&self) -> Result<RaftRole> {
        self.state().become_follower()
    }

    pub(crate) async fn tick(
        &mut self,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        event_tx: &mpsc::Sender<RaftEvent>,
        ctx: &RaftContext,
    ) -> Result<()> {
        self.state_mut().tick(role_tx, event_tx, ctx).await
    }

    pub(crate) async fn handle_raft_event(
        &mut self,
        raft_event: RaftEvent,
        ctx: &RaftContext,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        event_tx: &mpsc::Sender<RaftEvent>,
    ) -> Result<()> {
        self.state_mut()
            .handle_raft_event(raft_event, ctx, role_tx, event_tx)
            .await
    }
}

/// Answers a caller over its oneshot. A caller that already gave up is
/// logged, never an error for the event loop.
pub(crate) fn reply<T: std::fmt::Debug>(
    sender: oneshot::Sender<T>,
    response: T,
) {
    if let Err(response) = sender.send(response) {
        warn!("caller stopped waiting, reply dropped: {:?}", response);
    }
}
