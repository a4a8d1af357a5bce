use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::follower_state::FollowerState;
use super::role_state::RaftRoleState;
use super::reply;
use super::RaftRole;
use super::SharedState;
use crate::proto::client::ClientResponse;
use crate::proto::election::TimeoutNowResponse;
use crate::proto::election::VoteResponse;
use crate::proto::election::VotedFor;
use crate::proto::replication::AppendEntriesResponse;
use crate::ConsensusError;
use crate::ElectionError;
use crate::ElectionHandler;
use crate::ElectionTimer;
use crate::RaftContext;
use crate::RaftEvent;
use crate::RaftNodeConfig;
use crate::Result;
use crate::RoleEvent;
use crate::StateTransitionError;
use crate::ELECTIONS_STARTED_METRIC;

pub struct CandidateState {
    // -- Core State --
    pub shared_state: SharedState,

    // -- Cluster Configuration --
    pub(super) node_config: Arc<RaftNodeConfig>,

    // -- Election Timing --
    pub(super) timer: ElectionTimer,

    /// Granted votes in the current term, self included
    pub(super) votes: HashSet<u32>,
}

#[async_trait]
impl RaftRoleState for CandidateState {
    fn shared_state(&self) -> &SharedState {
        &self.shared_state
    }

    fn shared_state_mut(&mut self) -> &mut SharedState {
        &mut self.shared_state
    }

    fn is_candidate(&self) -> bool {
        true
    }

    fn become_leader(&self) -> Result<RaftRole> {
        if !self.has_quorum_of(self.votes.len()) {
            warn!("[{}] become_leader without a quorum of votes", self.node_id());
            return Err(StateTransitionError::NotEnoughVotes.into());
        }
        info!(
            "[{}<{}>] >>> switch to Leader now.",
            self.node_id(),
            self.current_term()
        );
        Ok(RaftRole::Leader(Box::new(self.into())))
    }

    fn become_candidate(&self) -> Result<RaftRole> {
        warn!("I am candidate already");

        Err(StateTransitionError::InvalidTransition.into())
    }

    fn become_follower(&self) -> Result<RaftRole> {
        info!(
            "[{}<{}>] >>> switch to Follower now.",
            self.node_id(),
            self.current_term()
        );
        Ok(RaftRole::Follower(Box::new(self.into())))
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

    /// No quorum within the election timeout: try again in a new term
    async fn tick(
        &mut self,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        event_tx: &mpsc::Sender<RaftEvent>,
        ctx: &RaftContext,
    ) -> Result<()> {
        if !self.timer.is_expired() {
            return Ok(());
        }
        let failure = ElectionError::QuorumFailure {
            required: ctx.cluster().quorum(),
            succeed: self.votes.len(),
        };
        debug!(
            "[{}] election in term {} timed out: {}",
            self.node_id(),
            self.current_term(),
            failure
        );
        self.start_election(ctx, role_tx, event_tx)
    }

    async fn handle_raft_event(
        &mut self,
        raft_event: RaftEvent,
        ctx: &RaftContext,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        event_tx: &mpsc::Sender<RaftEvent>,
    ) -> Result<()> {
        let my_id = self.node_id();

        match raft_event {
            RaftEvent::ReceiveVoteRequest(vote_request, sender) => {
                if vote_request.term > self.current_term() {
                    self.step_into_term(vote_request.term, ctx)?;
                    self.step_down_and_replay(role_tx, None, RaftEvent::ReceiveVoteRequest(vote_request, sender))?;
                    return Ok(());
                }

                // voted for myself in this term
                let last = ctx.raft_log().last_log_id();
                reply(sender, Ok(VoteResponse {
                    term: self.current_term(),
                    vote_granted: false,
                    last_log_index: last.index,
                    last_log_term: last.term,
                }));
            }

            RaftEvent::AppendEntries(request, sender) => {
                if request.term < self.current_term() {
                    reply(sender, Ok(AppendEntriesResponse::higher_term(my_id, self.current_term())));
                    return Ok(());
                }

                // a leader exists for this term or a later one
                self.step_into_term(request.term, ctx)?;
                let leader_id = request.leader_id;
                self.step_down_and_replay(role_tx, Some(leader_id), RaftEvent::AppendEntries(request, sender))?;
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
                reply(sender, Ok(TimeoutNowResponse {
                    term: self.current_term(),
                    accepted: true,
                }));
                self.start_election(ctx, role_tx, event_tx)?;
            }

            RaftEvent::ClientPropose(_proposal, sender) => {
                reply(sender, ClientResponse::NotLeader { leader_hint: None });
            }

            RaftEvent::TransferLeadership(_target, sender) => {
                reply(sender, Err(ConsensusError::NotLeader { leader_id: None }.into()));
            }

            RaftEvent::VoteResult {
                peer_id,
                request_term,
                response,
            } => {
                if request_term != self.current_term() {
                    debug!("stale vote result from {} for term {}", peer_id, request_term);
                    return Ok(());
                }

                let response = match response {
                    Ok(r) => r,
                    Err(e) => {
                        debug!("[{}] vote request to {} failed: {:?}", my_id, peer_id, e);
                        return Ok(());
                    }
                };
                match ElectionHandler::check_vote_response(self.current_term(), &response) {
                    Ok(true) => {
                        debug!("[{}] vote granted by {} in term {}", my_id, peer_id, response.term);
                        if self.votes.insert(peer_id) && self.votes.len() == ctx.cluster().quorum() {
                            self.send_role_event(role_tx, RoleEvent::BecomeLeader)?;
                        }
                    }
                    Ok(false) => {
                        debug!("[{}] vote refused by {}: {:?}", my_id, peer_id, response);
                    }
                    Err(ElectionError::HigherTerm(term)) => {
                        info!("[{}] found higher term {} from {}", my_id, term, peer_id);
                        self.step_into_term(term, ctx)?;
                        self.send_role_event(role_tx, RoleEvent::BecomeFollower(None))?;
                    }
                    Err(e) => {
                        warn!("[{}] unexpected vote result from {}: {}", my_id, peer_id, e);
                    }
                }
            }

            RaftEvent::AppendResult { response, .. } => {
                if let Ok(r) = response {
                    if r.term > self.current_term() {
                        self.step_into_term(r.term, ctx)?;
                        self.send_role_event(role_tx, RoleEvent::BecomeFollower(None))?;
                    }
                }
            }

            RaftEvent::TimeoutNowResult { response, .. } => {
                if let Ok(r) = response {
                    if r.term > self.current_term() {
                        self.step_into_term(r.term, ctx)?;
                        self.send_role_event(role_tx, RoleEvent::BecomeFollower(None))?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl CandidateState {
    pub fn new(
        shared_state: SharedState,
        node_config: Arc<RaftNodeConfig>,
    ) -> Self {
        let timer = ElectionTimer::new(node_config.raft.election.timeout_range());
        Self {
            shared_state,
            node_config,
            timer,
            votes: HashSet::new(),
        }
    }

    /// Starts a new term: vote for myself, persist, then ask every peer.
    ///
    /// The election timer is re-armed with a fresh random timeout so split
    /// votes resolve.
    pub(crate) fn start_election(
        &mut self,
        ctx: &RaftContext,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        event_tx: &mpsc::Sender<RaftEvent>,
    ) -> Result<()> {
        let my_id = self.node_id();
        let term = self.current_term() + 1;
        {
            let hard_state = &mut self.shared_state.hard_state;
            hard_state.current_term = term;
            hard_state.voted_for = Some(VotedFor {
                voted_for_id: my_id,
                voted_for_term: term,
            });
        }
        self.persist_hard_state(ctx)?;

        ctx.cluster().reset_leader();
        self.timer.reset();
        self.votes.clear();
        self.votes.insert(my_id);

        ELECTIONS_STARTED_METRIC.with_label_values(&[&my_id.to_string()]).inc();
        info!("[{}] start election in term {}", my_id, term);

        if self.has_quorum_of(self.votes.len()) {
            return self.send_role_event(role_tx, RoleEvent::BecomeLeader);
        }

        let rpc_timeout = self.node_config.retry.election.timeout();
        ctx.election_handler().broadcast_vote_requests(
            term,
            ctx.cluster().peer_ids(),
            ctx.raft_log(),
            ctx.transport(),
            event_tx,
            rpc_timeout,
        );
        Ok(())
    }

    fn has_quorum_of(
        &self,
        votes: usize,
    ) -> bool {
        votes >= crate::cluster::majority_count(self.node_config.cluster.initial_cluster.len())
    }

    fn step_down_and_replay(
        &self,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        leader_id: Option<u32>,
        raft_event: RaftEvent,
    ) -> Result<()> {
        self.send_role_event(role_tx, RoleEvent::BecomeFollower(leader_id))?;
        self.send_role_event(role_tx, RoleEvent::ReprocessEvent(Box::new(raft_event)))
    }
}

impl From<&FollowerState> for CandidateState {
    fn from(follower_state: &FollowerState) -> Self {
        Self::new(follower_state.shared_state.clone(), follower_state.node_config.clone())
    }
}

impl Debug for CandidateState {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CandidateState")
            .field("shared_state", &self.shared_state)
            .field("votes", &self.votes)
            .finish()
    }
}
