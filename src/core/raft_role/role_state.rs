use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::RaftRole;
use super::SharedState;
use crate::proto::election::VotedFor;
use crate::Error;
use crate::NetworkError;
use crate::RaftContext;
use crate::RaftEvent;
use crate::Result;
use crate::RoleEvent;
use crate::StateTransitionError;

/// Behaviour every role shares. Each role overrides what differs.
#[async_trait]
pub trait RaftRoleState: Send + Sync + 'static {
    //--- For sharing state behaviors
    fn shared_state(&self) -> &SharedState;
    fn shared_state_mut(&mut self) -> &mut SharedState;
    fn node_id(&self) -> u32 {
        self.shared_state().node_id
    }

    fn is_follower(&self) -> bool {
        false
    }
    fn is_candidate(&self) -> bool {
        false
    }
    fn is_leader(&self) -> bool {
        false
    }

    fn become_leader(&self) -> Result<RaftRole> {
        warn!("become_leader Illegal");
        Err(StateTransitionError::InvalidTransition.into())
    }
    fn become_candidate(&self) -> Result<RaftRole> {
        warn!("become_candidate Illegal");
        Err(StateTransitionError::InvalidTransition.into())
    }
    fn become_follower(&self) -> Result<RaftRole> {
        warn!("become_follower Illegal");
        Err(StateTransitionError::InvalidTransition.into())
    }

    /// Called right before this role is replaced by a follower
    fn on_step_down(
        &mut self,
        _ctx: &RaftContext,
        _leader_hint: Option<u32>,
    ) {
    }

    //--- Shared States
    fn current_term(&self) -> u64 {
        self.shared_state().current_term()
    }
    fn commit_index(&self) -> u64 {
        self.shared_state().commit_index
    }
    fn voted_for(&self) -> Option<VotedFor> {
        self.shared_state().voted_for()
    }

    fn update_commit_index(
        &mut self,
        new_commit_index: u64,
    ) {
        if self.commit_index() < new_commit_index {
            debug!("update_commit_index to: {:?}", new_commit_index);
            self.shared_state_mut().commit_index = new_commit_index;
        }
    }

    fn update_commit_index_with_signal(
        &mut self,
        new_commit_index: u64,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
    ) -> Result<()> {
        if new_commit_index <= self.commit_index() {
            return Ok(());
        }
        self.update_commit_index(new_commit_index);

        debug!("send(RoleEvent::NotifyNewCommitIndex");
        self.send_role_event(role_tx, RoleEvent::NotifyNewCommitIndex { new_commit_index })
    }

    /// Writes term and vote to stable storage. A failure here is fatal: the
    /// node must not answer an RPC on state it could not persist.
    fn persist_hard_state(
        &self,
        ctx: &RaftContext,
    ) -> Result<()> {
        let hard_state = self.shared_state().hard_state;
        ctx.state_storage().save_hard_state(hard_state).map_err(|e| {
            error!("[{}] persist hard state {:?} failed: {:?}", self.node_id(), hard_state, e);
            Error::persistence("hard state", e)
        })
    }

    /// Adopts a newer term observed on the wire: clears the vote and
    /// persists before anything else happens in that term.
    fn step_into_term(
        &mut self,
        term: u64,
        ctx: &RaftContext,
    ) -> Result<()> {
        if term <= self.current_term() {
            return Ok(());
        }
        debug!("[{}] term {} -> {}", self.node_id(), self.current_term(), term);
        let hard_state = &mut self.shared_state_mut().hard_state;
        hard_state.current_term = term;
        hard_state.voted_for = None;
        self.persist_hard_state(ctx)
    }

    fn send_role_event(
        &self,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        event: RoleEvent,
    ) -> Result<()> {
        role_tx.send(event).map_err(|e| {
            let error_str = format!("{:?}", e);
            error!("Failed to send: {}", error_str);
            NetworkError::SignalSendFailed(error_str).into()
        })
    }

    //--- Timer related ---
    fn next_deadline(&self) -> Instant;
    fn is_timer_expired(&self) -> bool;
    fn reset_timer(&mut self);

    async fn tick(
        &mut self,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        event_tx: &mpsc::Sender<RaftEvent>,
        ctx: &RaftContext,
    ) -> Result<()>;

    async fn handle_raft_event(
        &mut self,
        raft_event: RaftEvent,
        ctx: &RaftContext,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        event_tx: &mpsc::Sender<RaftEvent>,
    ) -> Result<()>;
}
