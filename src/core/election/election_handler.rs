use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;
use tracing::warn;

use super::StateUpdate;
use crate::async_task::task_with_timeout;
use crate::is_target_log_more_recent;
use crate::proto::election::VoteRequest;
use crate::proto::election::VoteResponse;
use crate::proto::election::VotedFor;
use crate::ElectionError;
use crate::RaftEvent;
use crate::RaftLog;
use crate::Transport;

#[derive(Clone)]
pub struct ElectionHandler {
    pub(crate) my_id: u32,
}

impl ElectionHandler {
    pub(crate) fn new(my_id: u32) -> Self {
        Self { my_id }
    }

    /// Sends a RequestVote to every peer in parallel.
    ///
    /// Each request runs in its own task bounded by `rpc_timeout`; the
    /// outcome comes back to the event loop as `RaftEvent::VoteResult`, so
    /// the candidate counts votes without blocking on slow peers.
    pub(crate) fn broadcast_vote_requests(
        &self,
        term: u64,
        peers: Vec<u32>,
        raft_log: &Arc<dyn RaftLog>,
        transport: &Arc<dyn Transport>,
        event_tx: &mpsc::Sender<RaftEvent>,
        rpc_timeout: Duration,
    ) {
        let last = raft_log.last_log_id();
        debug!(
            "[{}] broadcast_vote_requests in term {} to {:?}, last_log={:?}",
            self.my_id, term, peers, last
        );

        for peer_id in peers {
            let request = VoteRequest {
                term,
                candidate_id: self.my_id,
                last_log_index: last.index,
                last_log_term: last.term,
            };
            let transport = transport.clone();
            let event_tx = event_tx.clone();

            tokio::spawn(async move {
                let response =
                    task_with_timeout(peer_id, rpc_timeout, transport.send_vote_request(peer_id, request)).await;

                if let Err(e) = event_tx
                    .send(RaftEvent::VoteResult {
                        peer_id,
                        request_term: term,
                        response,
                    })
                    .await
                {
                    debug!("vote result from {} dropped: {:?}", peer_id, e);
                }
            });
        }
    }

    /// Decides a vote request against the local term, vote and log.
    ///
    /// A newer request term is always reported in `term_update`, granted
    /// or not; the vote recorded for the old term does not carry over.
    pub fn handle_vote_request(
        &self,
        request: &VoteRequest,
        current_term: u64,
        voted_for_option: Option<VotedFor>,
        raft_log: &Arc<dyn RaftLog>,
    ) -> StateUpdate {
        debug!("VoteRequest::Received: {:?}", request);

        let mut update = StateUpdate::default();
        let mut effective_term = current_term;
        let mut effective_vote = voted_for_option;

        if request.term > current_term {
            update.term_update = Some(request.term);
            effective_term = request.term;
            effective_vote = None;
        }

        let last = raft_log.last_log_id();
        if self.check_vote_request_is_legal(request, effective_term, last.index, last.term, effective_vote) {
            debug!(
                "[{}] grant vote to {} in term {}",
                self.my_id, request.candidate_id, request.term
            );
            update.new_voted_for = Some(VotedFor {
                voted_for_id: request.candidate_id,
                voted_for_term: request.term,
            });
        }

        update
    }

    /// The function to check RPC request is legal or not
    ///
    /// Criteria to check:
    /// - request term is not behind ours
    /// - votedFor is null or candidateId
    /// - candidate's log is at least as up-to-date as receiver's log
    pub fn check_vote_request_is_legal(
        &self,
        request: &VoteRequest,
        current_term: u64,
        last_log_index: u64,
        last_log_term: u64,
        voted_for_option: Option<VotedFor>,
    ) -> bool {
        if current_term > request.term {
            debug!("current_term({:?}) > request.term({:?})", current_term, request.term);
            return false;
        }

        if let Some(vf) = voted_for_option {
            if vf.voted_for_term == request.term && vf.voted_for_id != request.candidate_id {
                debug!(
                    "already voted for {} in term {}, reject {}",
                    vf.voted_for_id, vf.voted_for_term, request.candidate_id
                );
                return false;
            }
        }

        if !is_target_log_more_recent(
            last_log_index,
            last_log_term,
            request.last_log_index,
            request.last_log_term,
        ) {
            warn!(
                "[{}] candidate {} log (index={}, term={}) is behind mine (index={}, term={})",
                self.my_id,
                request.candidate_id,
                request.last_log_index,
                request.last_log_term,
                last_log_index,
                last_log_term
            );
            return false;
        }

        true
    }

    /// As Candidate: whether `response` grants the vote of `current_term`.
    /// A newer term in the answer ends the election.
    pub(crate) fn check_vote_response(
        current_term: u64,
        response: &VoteResponse,
    ) -> std::result::Result<bool, ElectionError> {
        if response.term > current_term {
            return Err(ElectionError::HigherTerm(response.term));
        }
        Ok(response.vote_granted && response.term == current_term)
    }
}

impl Debug for ElectionHandler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ElectionHandler").field("my_id", &self.my_id).finish()
    }
}
