use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::candidate_state::CandidateState;
use super::leader_state::LeaderState;
use super::role_state::RaftRoleState;
use super::reply;
use super::RaftRole;
use super::SharedState;
use crate::proto::client::ClientResponse;
use crate::proto::election::TimeoutNowResponse;
use crate::proto::election::VoteResponse;
use crate::proto::replication::AppendEntriesResponse;
use crate::ConsensusError;
use crate::ElectionTimer;
use crate::Error;
use crate::RaftContext;
use crate::RaftEvent;
use crate::RaftNodeConfig;
use crate::ReplicationError;
use crate::Result;
use crate::RoleEvent;
use crate::StateTransitionError;
use crate::CLIENT_REDIRECTS_METRIC;

/// Follower node's state in Raft consensus.
///
/// Answers leader heartbeats and log replication, grants votes, and turns
/// candidate when the leader goes quiet for a full election timeout.
pub struct FollowerState {
    // -- Core State --
    pub shared_state: SharedState,

    // -- Cluster Configuration --
    pub(super) node_config: Arc<RaftNodeConfig>,

    // -- Election Timing --
    /// Leader heartbeat detection timer
    pub(super) timer: ElectionTimer,
}

#[async_trait]
impl RaftRoleState for FollowerState {
    fn shared_state(&self) -> &SharedState {
        &self.shared_state
    }

    fn shared_state_mut(&mut self) -> &mut SharedState {
        &mut self.shared_state
    }

    fn is_follower(&self) -> bool {
        true
    }

    fn become_leader(&self) -> Result<RaftRole> {
        error!("become_leader Illegal. I am Follower");

        Err(StateTransitionError::InvalidTransition.into())
    }

    fn become_candidate(&self) -> Result<RaftRole> {
        info!(
            "[{}<{}>] >>> switch to Candidate now.",
            self.node_id(),
            self.current_term()
        );
        Ok(RaftRole::Candidate(Box::new(self.into())))
    }

    fn become_follower(&self) -> Result<RaftRole> {
        warn!("I am follower already");

        Err(StateTransitionError::InvalidTransition.into())
    }

    fn is_timer_expired(&self) -> bool {
        self.timer.is_expired()
    }

    fn reset_timer(&mut self) {
        self.timer.reset()
    }

    fn next_deadline(&self) -> Instant {
        self.timer.next_deadline()
    }

    /// Election timeout without hearing from a leader: become candidate
    async fn tick(
        &mut self,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        _event_tx: &mpsc::Sender<RaftEvent>,
        _ctx: &RaftContext,
    ) -> Result<()> {
        if !self.timer.is_expired() {
            return Ok(());
        }
        debug!("[{}] election timeout, start election", self.node_id());
        self.reset_timer();
        self.send_role_event(role_tx, RoleEvent::BecomeCandidate)
    }

    async fn handle_raft_event(
        &mut self,
        raft_event: RaftEvent,
        ctx: &RaftContext,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        _event_tx: &mpsc::Sender<RaftEvent>,
    ) -> Result<()> {
        let my_id = self.node_id();

        match raft_event {
            RaftEvent::ReceiveVoteRequest(vote_request, sender) => {
                let state_update = ctx.election_handler().handle_vote_request(
                    &vote_request,
                    self.current_term(),
                    self.voted_for(),
                    ctx.raft_log(),
                );
                debug!("handle_vote_request with state_update: {:?}", &state_update);

                if !state_update.is_empty() {
                    let hard_state = &mut self.shared_state.hard_state;
                    if let Some(term) = state_update.term_update {
                        hard_state.current_term = term;
                        hard_state.voted_for = None;
                    }
                    if let Some(voted_for) = state_update.new_voted_for {
                        hard_state.voted_for = Some(voted_for);
                    }
                    self.persist_hard_state(ctx)?;
                }

                if state_update.vote_granted() {
                    self.reset_timer();
                }

                let last = ctx.raft_log().last_log_id();
                let response = VoteResponse {
                    term: self.current_term(),
                    vote_granted: state_update.vote_granted(),
                    last_log_index: last.index,
                    last_log_term: last.term,
                };
                debug!("Response candidate_{} with response: {:?}", vote_request.candidate_id, response);
                reply(sender, Ok(response));
            }

            RaftEvent::AppendEntries(request, sender) => {
                if request.term < self.current_term() {
                    debug!(
                        "reject append from stale leader {} (term {} < {})",
                        request.leader_id,
                        request.term,
                        self.current_term()
                    );
                    reply(sender, Ok(AppendEntriesResponse::higher_term(my_id, self.current_term())));
                    return Ok(());
                }

                self.step_into_term(request.term, ctx)?;
                ctx.cluster().mark_leader_id(request.leader_id);
                self.reset_timer();

                let result = ctx.replication_handler().handle_append_entries(
                    request,
                    self.current_term(),
                    self.commit_index(),
                    ctx.raft_log(),
                );

                match result {
                    Ok(out) => {
                        if let Some(new_commit_index) = out.commit_index_update {
                            self.update_commit_index_with_signal(new_commit_index, role_tx)?;
                        }
                        reply(sender, Ok(out.response));
                    }
                    Err(Error::Consensus(ConsensusError::Replication(
                        e @ ReplicationError::CommittedEntryConflict { .. },
                    ))) => {
                        error!("[{}] leader asked to overwrite committed entries: {}", my_id, e);
                        reply(sender, Err(e.into()));
                    }
                    Err(e) => {
                        error!("[{}] appending entries failed: {:?}", my_id, e);
                        return Err(Error::persistence("log entries", e));
                    }
                }
            }

            RaftEvent::TimeoutNow(request, sender) => {
                if request.term < self.current_term() {
                    reply(sender, Ok(TimeoutNowResponse {
                        term: self.current_term(),
                        accepted: false,
                    }));
                    return Ok(());
                }

                self.step_into_term(request.term, ctx)?;
                info!(
                    "[{}] TimeoutNow from leader {}, start election immediately",
                    my_id, request.leader_id
                );
                reply(sender, Ok(TimeoutNowResponse {
                    term: self.current_term(),
                    accepted: true,
                }));
                self.send_role_event(role_tx, RoleEvent::BecomeCandidate)?;
            }

            RaftEvent::ClientPropose(proposal, sender) => {
                let leader_hint = ctx.cluster().current_leader_id();
                debug!(
                    "redirect ({}, {}) to {:?}",
                    proposal.request.client_id, proposal.request.sequence, leader_hint
                );
                CLIENT_REDIRECTS_METRIC.with_label_values(&[&my_id.to_string()]).inc();
                reply(sender, ClientResponse::NotLeader { leader_hint });
            }

            RaftEvent::TransferLeadership(_target, sender) => {
                reply(sender, Err(ConsensusError::NotLeader {
                    leader_id: ctx.cluster().current_leader_id(),
                }
                .into()));
            }

            RaftEvent::VoteResult { response, .. } => {
                if let Ok(r) = response {
                    self.step_into_term(r.term, ctx)?;
                }
            }

            RaftEvent::AppendResult { response, .. } => {
                if let Ok(r) = response {
                    self.step_into_term(r.term, ctx)?;
                }
            }

            RaftEvent::TimeoutNowResult { response, .. } => {
                if let Ok(r) = response {
                    self.step_into_term(r.term, ctx)?;
                }
            }
        }
        Ok(())
    }
}

impl FollowerState {
    pub fn new(
        shared_state: SharedState,
        node_config: Arc<RaftNodeConfig>,
    ) -> Self {
        let timer = ElectionTimer::new(node_config.raft.election.timeout_range());
        Self {
            shared_state,
            node_config,
            timer,
        }
    }
}

impl From<&CandidateState> for FollowerState {
    fn from(candidate_state: &CandidateState) -> Self {
        Self::new(candidate_state.shared_state.clone(), candidate_state.node_config.clone())
    }
}

impl From<&LeaderState> for FollowerState {
    fn from(leader_state: &LeaderState) -> Self {
        Self::new(leader_state.shared_state.clone(), leader_state.node_config.clone())
    }
}

impl Debug for FollowerState {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FollowerState")
            .field("shared_state", &self.shared_state)
            .finish()
    }
}
