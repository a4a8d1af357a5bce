use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::candidate_state::CandidateState;
use super::follower_state::FollowerState;
use super::role_state::RaftRoleState;
use super::reply;
use super::RaftRole;
use super::SharedState;
use crate::proto::client::ClientResponse;
use crate::proto::common::Entry;
use crate::proto::common::LogId;
use crate::proto::election::TimeoutNowResponse;
use crate::proto::election::VoteResponse;
use crate::proto::replication::AppendEntriesResponse;
use crate::AppendRequestMeta;
use crate::ClientProposal;
use crate::ConsensusError;
use crate::ElectionError;
use crate::Error;
use crate::RaftContext;
use crate::RaftEvent;
use crate::RaftNodeConfig;
use crate::ReplicationError;
use crate::ReplicationHandler;
use crate::ReplicationTimer;
use crate::Result;
use crate::RoleEvent;
use crate::SessionCheck;
use crate::StateTransitionError;
use crate::Waiter;
use crate::APPEND_REJECTIONS_METRIC;
use crate::LEADERSHIP_TRANSFERS_METRIC;
use crate::LEADERS_ELECTED_METRIC;

/// A leadership handover in progress
#[derive(Debug)]
pub(crate) struct LeadershipTransfer {
    pub(crate) target: u32,
    pub(crate) deadline: Instant,
    /// Answered once the target accepts TimeoutNow, or the transfer fails
    pub(crate) sender: Option<oneshot::Sender<Result<()>>>,
    pub(crate) timeout_now_sent: bool,
}

pub struct LeaderState {
    // Leader State
    pub shared_state: SharedState,

    pub(super) next_index: HashMap<u32, u64>,
    pub(super) match_index: HashMap<u32, u64>,
    pub(super) noop_log_id: Option<u64>,

    /// Peers with an AppendEntries request on the wire
    pub(super) in_flight: HashSet<u32>,

    pub(super) transfer: Option<LeadershipTransfer>,

    pub(super) timer: ReplicationTimer,

    // Shared global settings
    pub(super) node_config: Arc<RaftNodeConfig>,
}

#[async_trait]
impl RaftRoleState for LeaderState {
    fn shared_state(&self) -> &SharedState {
        &self.shared_state
    }

    fn shared_state_mut(&mut self) -> &mut SharedState {
        &mut self.shared_state
    }

    fn is_leader(&self) -> bool {
        true
    }

    fn become_leader(&self) -> Result<RaftRole> {
        warn!("I am leader already");

        Err(StateTransitionError::InvalidTransition.into())
    }

    fn become_candidate(&self) -> Result<RaftRole> {
        error!("become_candidate Illegal. I am Leader");

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

    /// Fails every caller still waiting on this node and settles a pending
    /// transfer. Waiters retry against the new leader; the session table
    /// keeps the retry from applying twice.
    fn on_step_down(
        &mut self,
        ctx: &RaftContext,
        leader_hint: Option<u32>,
    ) {
        ctx.pending.fail_all(ClientResponse::NotLeader { leader_hint });

        if let Some(transfer) = self.transfer.take() {
            if let Some(sender) = transfer.sender {
                let result = if transfer.timeout_now_sent {
                    Ok(())
                } else {
                    Err(ConsensusError::NotLeader { leader_id: leader_hint }.into())
                };
                reply(sender, result);
            }
        }
    }

    fn is_timer_expired(&self) -> bool {
        self.timer.is_expired()
    }

    fn reset_timer(&mut self) {
        self.timer.reset_replication()
    }

    fn next_deadline(&self) -> Instant {
        match &self.transfer {
            Some(t) => self.timer.next_deadline().min(t.deadline),
            None => self.timer.next_deadline(),
        }
    }

    /// Heartbeat, and abort a transfer that ran out of time
    async fn tick(
        &mut self,
        _role_tx: &mpsc::UnboundedSender<RoleEvent>,
        event_tx: &mpsc::Sender<RaftEvent>,
        ctx: &RaftContext,
    ) -> Result<()> {
        let transfer_expired = self
            .transfer
            .as_ref()
            .map(|t| t.deadline <= Instant::now())
            .unwrap_or(false);
        if transfer_expired {
            let duration = self.node_config.raft.leadership_transfer.timeout();
            self.abort_transfer(move |target| ElectionError::TransferTimeout { target, duration }.into());
        }

        if self.timer.is_expired() {
            self.timer.reset_replication();
            self.replicate_to_all(ctx, event_tx)?;
        }
        Ok(())
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

                let last = ctx.raft_log().last_log_id();
                reply(sender, Ok(VoteResponse {
                    term: self.current_term(),
                    vote_granted: false,
                    last_log_index: last.index,
                    last_log_term: last.term,
                }));
            }

            RaftEvent::AppendEntries(request, sender) => {
                if request.term > self.current_term() {
                    self.step_into_term(request.term, ctx)?;
                    let leader_id = request.leader_id;
                    self.step_down_and_replay(role_tx, Some(leader_id), RaftEvent::AppendEntries(request, sender))?;
                    return Ok(());
                }

                if request.term == self.current_term() {
                    error!(
                        "[{}] node {} claims leadership of my term {}",
                        my_id, request.leader_id, request.term
                    );
                }
                reply(sender, Ok(AppendEntriesResponse::higher_term(my_id, self.current_term())));
            }

            RaftEvent::TimeoutNow(request, sender) => {
                if request.term > self.current_term() {
                    self.step_into_term(request.term, ctx)?;
                    let leader_id = request.leader_id;
                    self.step_down_and_replay(role_tx, Some(leader_id), RaftEvent::TimeoutNow(request, sender))?;
                    return Ok(());
                }
                reply(sender, Ok(TimeoutNowResponse {
                    term: self.current_term(),
                    accepted: false,
                }));
            }

            RaftEvent::ClientPropose(proposal, sender) => {
                self.handle_client_propose(proposal, sender, ctx, role_tx, event_tx)?;
            }

            RaftEvent::TransferLeadership(target, sender) => {
                self.handle_transfer_leadership(target, sender, ctx, event_tx)?;
            }

            RaftEvent::VoteResult { response, .. } => {
                if let Ok(r) = response {
                    if r.term > self.current_term() {
                        self.step_down(r.term, ctx, role_tx)?;
                    }
                }
            }

            RaftEvent::AppendResult {
                peer_id,
                request,
                response,
            } => {
                self.handle_append_result(peer_id, request, response, ctx, role_tx, event_tx)?;
            }

            RaftEvent::TimeoutNowResult {
                peer_id,
                request_term,
                response,
            } => {
                self.handle_timeout_now_result(peer_id, request_term, response, ctx, role_tx)?;
            }
        }
        Ok(())
    }
}

impl LeaderState {
    pub fn new(
        shared_state: SharedState,
        node_config: Arc<RaftNodeConfig>,
    ) -> Self {
        let timer = ReplicationTimer::new(node_config.raft.heartbeat_interval());
        Self {
            shared_state,
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            noop_log_id: None,
            in_flight: HashSet::new(),
            transfer: None,
            timer,
            node_config,
        }
    }

    /// First thing a new leader does: reset peer progress, append a no-op
    /// of its own term and announce itself.
    ///
    /// Entries from earlier terms cannot be committed by counting replicas;
    /// they commit once the no-op does.
    pub(crate) fn on_elected(
        &mut self,
        ctx: &RaftContext,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        event_tx: &mpsc::Sender<RaftEvent>,
    ) -> Result<()> {
        let my_id = self.node_id();
        let term = self.current_term();
        let last_index = ctx.raft_log().last_entry_id();

        for peer_id in ctx.cluster().peer_ids() {
            self.next_index.insert(peer_id, last_index + 1);
            self.match_index.insert(peer_id, 0);
        }

        let noop_index = last_index + 1;
        ctx.raft_log()
            .append_entries(vec![Entry::noop(noop_index, term)])
            .map_err(|e| Error::persistence("no-op entry", e))?;
        self.noop_log_id = Some(noop_index);

        ctx.cluster().mark_leader_id(my_id);
        LEADERS_ELECTED_METRIC.with_label_values(&[&my_id.to_string()]).inc();
        info!("[{}] leading term {} from index {}", my_id, term, noop_index);

        self.timer.reset_replication();
        self.replicate_to_all(ctx, event_tx)?;
        self.maybe_advance_commit(ctx, role_tx)
    }

    pub fn next_index(
        &self,
        peer_id: u32,
    ) -> Option<u64> {
        self.next_index.get(&peer_id).copied()
    }

    pub fn match_index(
        &self,
        peer_id: u32,
    ) -> Option<u64> {
        self.match_index.get(&peer_id).copied()
    }

    pub fn noop_log_id(&self) -> Option<u64> {
        self.noop_log_id
    }

    pub(crate) fn replicate_to_all(
        &mut self,
        ctx: &RaftContext,
        event_tx: &mpsc::Sender<RaftEvent>,
    ) -> Result<()> {
        for peer_id in ctx.cluster().peer_ids() {
            self.replicate_to_peer(peer_id, ctx, event_tx)?;
        }
        Ok(())
    }

    /// At most one AppendEntries per peer is on the wire. The next one goes
    /// out when its result arrives or on the next heartbeat.
    pub(crate) fn replicate_to_peer(
        &mut self,
        peer_id: u32,
        ctx: &RaftContext,
        event_tx: &mpsc::Sender<RaftEvent>,
    ) -> Result<()> {
        if self.in_flight.contains(&peer_id) {
            return Ok(());
        }

        let next_index = self
            .next_index
            .get(&peer_id)
            .copied()
            .unwrap_or_else(|| ctx.raft_log().last_entry_id() + 1);

        let request = ctx.replication_handler().build_append_request(
            self.current_term(),
            next_index,
            self.commit_index(),
            self.node_config.raft.replication.append_entries_max_entries_per_replication,
            ctx.raft_log(),
        )?;

        self.in_flight.insert(peer_id);
        ctx.replication_handler().spawn_append_entries(
            peer_id,
            request,
            ctx.transport(),
            event_tx,
            self.node_config.retry.append_entries.timeout(),
        );
        Ok(())
    }

    pub(crate) fn handle_append_result(
        &mut self,
        peer_id: u32,
        request: AppendRequestMeta,
        response: Result<AppendEntriesResponse>,
        ctx: &RaftContext,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        event_tx: &mpsc::Sender<RaftEvent>,
    ) -> Result<()> {
        if request.term != self.current_term() {
            debug!("stale append result from {} for term {}", peer_id, request.term);
            return Ok(());
        }
        self.in_flight.remove(&peer_id);

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                debug!("[{}] append to {} failed: {:?}", self.node_id(), peer_id, e);
                return Ok(());
            }
        };

        match ReplicationHandler::check_append_response(self.current_term(), request.prev_log_index, &response) {
            Ok(Some(matched)) => {
                let match_index = self.match_index.entry(peer_id).or_insert(0);
                if matched > *match_index {
                    *match_index = matched;
                }
                let next_index = self.next_index.entry(peer_id).or_insert(matched + 1);
                if matched + 1 > *next_index {
                    *next_index = matched + 1;
                }
                let next_index = *next_index;

                self.maybe_advance_commit(ctx, role_tx)?;
                if self.maybe_send_timeout_now(peer_id, ctx, event_tx) {
                    return Ok(());
                }

                if next_index <= ctx.raft_log().last_entry_id() {
                    self.replicate_to_peer(peer_id, ctx, event_tx)?;
                }
            }
            Ok(None) => {
                debug!("[{}] ignored append response {:?}", self.node_id(), response);
            }
            Err(ReplicationError::HigherTerm(term)) => {
                info!("[{}] peer {} is in newer term {}", self.node_id(), peer_id, term);
                return self.step_down(term, ctx, role_tx);
            }
            Err(ReplicationError::LogConflict { prev_log_index, hint }) => {
                APPEND_REJECTIONS_METRIC
                    .with_label_values(&[&self.node_id().to_string(), &peer_id.to_string()])
                    .inc();
                let next_index = ReplicationHandler::next_index_after_conflict(&hint, prev_log_index, ctx.raft_log());
                debug!(
                    "[{}] peer {} rejected prev_log_index {}, retry from {}",
                    self.node_id(),
                    peer_id,
                    prev_log_index,
                    next_index
                );
                self.next_index.insert(peer_id, next_index);
                self.replicate_to_peer(peer_id, ctx, event_tx)?;
            }
            Err(e) => {
                warn!("[{}] unexpected append result from {}: {}", self.node_id(), peer_id, e);
            }
        }
        Ok(())
    }

    /// Commits the highest index a majority holds, but only through an
    /// entry of the current term.
    pub(crate) fn maybe_advance_commit(
        &mut self,
        ctx: &RaftContext,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
    ) -> Result<()> {
        let peer_matched: Vec<u64> = self.match_index.values().copied().collect();
        if let Some(new_commit_index) =
            ctx.raft_log()
                .calculate_majority_matched_index(self.current_term(), self.commit_index(), peer_matched)
        {
            debug!("[{}] commit index -> {}", self.node_id(), new_commit_index);
            self.update_commit_index_with_signal(new_commit_index, role_tx)?;
        }
        Ok(())
    }

    fn handle_client_propose(
        &mut self,
        proposal: ClientProposal,
        sender: oneshot::Sender<ClientResponse>,
        ctx: &RaftContext,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
        event_tx: &mpsc::Sender<RaftEvent>,
    ) -> Result<()> {
        if let Some(transfer) = &self.transfer {
            reply(sender, ClientResponse::NotLeader {
                leader_hint: Some(transfer.target),
            });
            return Ok(());
        }

        let ClientProposal { request, request_id } = proposal;
        let client_id = request.client_id.clone();
        let sequence = request.sequence;

        // read before the session table: anything applied up to here is
        // already recorded there
        let last_applied = ctx.last_applied();
        match ctx.sessions.check(&client_id, sequence) {
            SessionCheck::Applied(result) => {
                debug!("({}, {}) already applied at {}", client_id, sequence, result.index);
                reply(sender, ClientResponse::Committed(result));
                return Ok(());
            }
            SessionCheck::Stale { last_applied_sequence } => {
                reply(sender, ClientResponse::StaleSequence { last_applied_sequence });
                return Ok(());
            }
            SessionCheck::New => {}
        }

        let term = self.current_term();
        let last_index = ctx.raft_log().last_entry_id();
        let existing = if last_applied < last_index {
            ctx.raft_log()
                .get_entries_range(last_applied + 1..=last_index)?
                .into_iter()
                .find(|e| e.is_request_of(&client_id, sequence))
                .map(|e| e.log_id())
        } else {
            None
        };

        let log_id = match existing {
            Some(log_id) => {
                debug!("({}, {}) is pending at {:?}", client_id, sequence, log_id);
                log_id
            }
            None => {
                let index = last_index + 1;
                ctx.raft_log()
                    .append_entries(vec![Entry::command(index, term, request.into_command())])
                    .map_err(|e| Error::persistence("client entry", e))?;
                LogId { index, term }
            }
        };

        ctx.pending.register(
            log_id.index,
            Waiter {
                request_id: request_id.clone(),
                term: log_id.term,
                sender,
            },
        );

        // applied between the first check and the registration
        if let SessionCheck::Applied(result) = ctx.sessions.check(&client_id, sequence) {
            if let Some(waiter) = ctx.pending.cancel(&request_id) {
                reply(waiter.sender, ClientResponse::Committed(result));
            }
        }

        self.replicate_to_all(ctx, event_tx)?;
        self.maybe_advance_commit(ctx, role_tx)
    }

    fn handle_transfer_leadership(
        &mut self,
        target: u32,
        sender: oneshot::Sender<Result<()>>,
        ctx: &RaftContext,
        event_tx: &mpsc::Sender<RaftEvent>,
    ) -> Result<()> {
        if let Some(transfer) = &self.transfer {
            reply(sender, Err(ElectionError::TransferInProgress {
                target: transfer.target,
            }
            .into()));
            return Ok(());
        }

        if target == self.node_id() || !ctx.cluster().contains(target) {
            reply(sender, Err(ElectionError::InvalidTransferTarget { target }.into()));
            return Ok(());
        }

        info!(
            "[{}] transfer leadership of term {} to {}",
            self.node_id(),
            self.current_term(),
            target
        );
        LEADERSHIP_TRANSFERS_METRIC
            .with_label_values(&[&self.node_id().to_string()])
            .inc();

        self.transfer = Some(LeadershipTransfer {
            target,
            deadline: Instant::now() + self.node_config.raft.leadership_transfer.timeout(),
            sender: Some(sender),
            timeout_now_sent: false,
        });

        if !self.maybe_send_timeout_now(target, ctx, event_tx) {
            self.replicate_to_peer(target, ctx, event_tx)?;
        }
        Ok(())
    }

    /// Sends TimeoutNow once the transfer target holds the whole log.
    fn maybe_send_timeout_now(
        &mut self,
        peer_id: u32,
        ctx: &RaftContext,
        event_tx: &mpsc::Sender<RaftEvent>,
    ) -> bool {
        let matched = self.match_index.get(&peer_id).copied().unwrap_or(0);
        let last_index = ctx.raft_log().last_entry_id();
        let term = self.current_term();
        let rpc_timeout = self.node_config.retry.append_entries.timeout();

        match self.transfer.as_mut() {
            Some(t) if t.target == peer_id && !t.timeout_now_sent && matched >= last_index => {
                debug!("transfer target {} caught up at {}, send TimeoutNow", peer_id, matched);
                t.timeout_now_sent = true;
                ctx.replication_handler()
                    .spawn_timeout_now(peer_id, term, ctx.transport(), event_tx, rpc_timeout);
                true
            }
            _ => false,
        }
    }

    fn handle_timeout_now_result(
        &mut self,
        peer_id: u32,
        request_term: u64,
        response: Result<TimeoutNowResponse>,
        ctx: &RaftContext,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
    ) -> Result<()> {
        if request_term != self.current_term() {
            return Ok(());
        }

        match response {
            Ok(r) if r.term > self.current_term() => self.step_down(r.term, ctx, role_tx),
            Ok(r) if r.accepted => {
                info!("[{}] {} accepted TimeoutNow", self.node_id(), peer_id);
                // stays pending until the target's election deposes us or
                // the deadline passes
                if let Some(sender) = self.transfer.as_mut().and_then(|t| t.sender.take()) {
                    reply(sender, Ok(()));
                }
                Ok(())
            }
            Ok(r) => {
                warn!("[{}] {} rejected TimeoutNow in term {}", self.node_id(), peer_id, r.term);
                self.abort_transfer(|target| ElectionError::TransferRejected { target, term: r.term }.into());
                Ok(())
            }
            Err(e) => {
                warn!("[{}] TimeoutNow to {} failed: {:?}", self.node_id(), peer_id, e);
                self.abort_transfer(|_| e);
                Ok(())
            }
        }
    }

    fn abort_transfer(
        &mut self,
        error: impl FnOnce(u32) -> Error,
    ) {
        if let Some(transfer) = self.transfer.take() {
            warn!("[{}] leadership transfer to {} aborted", self.node_id(), transfer.target);
            if let Some(sender) = transfer.sender {
                reply(sender, Err(error(transfer.target)));
            }
        }
    }

    fn step_down(
        &mut self,
        term: u64,
        ctx: &RaftContext,
        role_tx: &mpsc::UnboundedSender<RoleEvent>,
    ) -> Result<()> {
        self.step_into_term(term, ctx)?;
        self.send_role_event(role_tx, RoleEvent::BecomeFollower(None))
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

impl From<&CandidateState> for LeaderState {
    fn from(candidate_state: &CandidateState) -> Self {
        Self::new(candidate_state.shared_state.clone(), candidate_state.node_config.clone())
    }
}

impl Debug for LeaderState {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LeaderState")
            .field("shared_state", &self.shared_state)
            .field("next_index", &self.next_index)
            .field("match_index", &self.match_index)
            .field("noop_log_id", &self.noop_log_id)
            .finish()
    }
}
