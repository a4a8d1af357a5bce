use std::cmp;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;
use tracing::warn;

use super::AppendResponseWithUpdates;
use crate::async_task::task_with_timeout;
use crate::proto::election::TimeoutNowRequest;
use crate::proto::replication::AppendEntriesRequest;
use crate::proto::replication::AppendEntriesResponse;
use crate::proto::replication::ConflictHint;
use crate::AppendRequestMeta;
use crate::RaftEvent;
use crate::RaftLog;
use crate::ReplicationError;
use crate::Result;
use crate::Transport;

#[derive(Clone)]
pub struct ReplicationHandler {
    pub(crate) my_id: u32,
}

impl ReplicationHandler {
    pub fn new(my_id: u32) -> Self {
        Self { my_id }
    }

    /// As Follower only.
    ///
    /// The caller has already rejected older terms and adopted a newer one,
    /// so `current_term == request.term` here.
    pub fn handle_append_entries(
        &self,
        request: AppendEntriesRequest,
        current_term: u64,
        commit_index: u64,
        raft_log: &Arc<dyn RaftLog>,
    ) -> Result<AppendResponseWithUpdates> {
        debug!(
            "[F-{}] >> append from {}: prev=({}, {}), entries={}, leader_commit={}",
            self.my_id,
            request.leader_id,
            request.prev_log_index,
            request.prev_log_term,
            request.entries.len(),
            request.leader_commit_index
        );

        let prev_log_index = request.prev_log_index;
        let leader_commit_index = request.leader_commit_index;

        match raft_log.filter_out_conflicts_and_append(
            prev_log_index,
            request.prev_log_term,
            request.entries,
            commit_index,
        )? {
            Some(match_index) => {
                let commit_index_update =
                    Self::if_update_commit_index_as_follower(commit_index, match_index, leader_commit_index);
                if let Some(new_commit_index) = commit_index_update {
                    debug!("new commit index received: {:?}", new_commit_index);
                }

                Ok(AppendResponseWithUpdates {
                    response: AppendEntriesResponse::success(self.my_id, current_term, match_index),
                    commit_index_update,
                })
            }
            None => {
                let hint = Self::conflict_hint(prev_log_index, raft_log);
                warn!(
                    "[F-{}] prev log check failed at {}: hint={:?}",
                    self.my_id, prev_log_index, hint
                );

                Ok(AppendResponseWithUpdates {
                    response: AppendEntriesResponse::conflict(self.my_id, current_term, hint),
                    commit_index_update: None,
                })
            }
        }
    }

    /// Where the leader should look next after our log failed the check
    /// at `prev_log_index`.
    pub(crate) fn conflict_hint(
        prev_log_index: u64,
        raft_log: &Arc<dyn RaftLog>,
    ) -> ConflictHint {
        let last_index = raft_log.last_entry_id();
        if prev_log_index > last_index {
            return ConflictHint {
                conflict_index: last_index + 1,
                conflict_term: None,
            };
        }

        match raft_log.entry_term(prev_log_index) {
            Some(term) => ConflictHint {
                conflict_index: raft_log.first_index_for_term(term).unwrap_or(prev_log_index),
                conflict_term: Some(term),
            },
            None => ConflictHint {
                conflict_index: prev_log_index,
                conflict_term: None,
            },
        }
    }

    /// If leaderCommit > commitIndex, set commitIndex = min(leaderCommit,
    /// index of last new entry)
    pub(crate) fn if_update_commit_index_as_follower(
        my_commit_index: u64,
        match_index: u64,
        leader_commit_index: u64,
    ) -> Option<u64> {
        let candidate = cmp::min(leader_commit_index, match_index);
        if candidate > my_commit_index {
            return Some(candidate);
        }
        None
    }

    /// As Leader: sorts a follower's answer to a request sent after
    /// `prev_log_index`. `Ok(Some(_))` is the follower's match index,
    /// `Ok(None)` an answer that carries nothing to act on.
    pub(crate) fn check_append_response(
        current_term: u64,
        prev_log_index: u64,
        response: &AppendEntriesResponse,
    ) -> std::result::Result<Option<u64>, ReplicationError> {
        if response.term > current_term {
            return Err(ReplicationError::HigherTerm(response.term));
        }
        if response.success {
            return Ok(Some(response.match_index));
        }
        match response.conflict {
            Some(hint) => Err(ReplicationError::LogConflict { prev_log_index, hint }),
            None => Ok(None),
        }
    }

    /// As Leader: the next index to probe after a rejected request.
    ///
    /// Skips the whole conflicting term when the leader holds entries of it,
    /// otherwise jumps to the follower's hint. The result always moves
    /// backwards and never below 1.
    pub(crate) fn next_index_after_conflict(
        hint: &ConflictHint,
        prev_log_index: u64,
        raft_log: &Arc<dyn RaftLog>,
    ) -> u64 {
        let next = match hint.conflict_term {
            Some(term) => match raft_log.last_index_for_term(term) {
                Some(last) => last + 1,
                None => hint.conflict_index,
            },
            None => hint.conflict_index,
        };

        next.clamp(1, prev_log_index.max(1))
    }

    /// Build an append request for a single peer starting at `next_index`.
    pub(crate) fn build_append_request(
        &self,
        current_term: u64,
        next_index: u64,
        commit_index: u64,
        max_entries: u64,
        raft_log: &Arc<dyn RaftLog>,
    ) -> Result<AppendEntriesRequest> {
        let last_index = raft_log.last_entry_id();
        let next_index = next_index.clamp(1, last_index + 1);
        let prev_log_index = next_index - 1;
        let prev_log_term = raft_log.prev_log_term(prev_log_index).unwrap_or(0);

        let entries = if next_index <= last_index {
            let upper = cmp::min(last_index, next_index + max_entries.max(1) - 1);
            raft_log.get_entries_range(next_index..=upper)?
        } else {
            Vec::new()
        };

        Ok(AppendEntriesRequest {
            term: current_term,
            leader_id: self.my_id,
            prev_log_index,
            prev_log_term,
            entries,
            leader_commit_index: commit_index,
        })
    }

    /// Sends one AppendEntries in the background; the outcome comes back as
    /// `RaftEvent::AppendResult`.
    pub(crate) fn spawn_append_entries(
        &self,
        peer_id: u32,
        request: AppendEntriesRequest,
        transport: &Arc<dyn Transport>,
        event_tx: &mpsc::Sender<RaftEvent>,
        rpc_timeout: Duration,
    ) {
        let meta = AppendRequestMeta {
            term: request.term,
            prev_log_index: request.prev_log_index,
            entries_len: request.entries.len() as u64,
        };
        let transport = transport.clone();
        let event_tx = event_tx.clone();

        tokio::spawn(async move {
            let response =
                task_with_timeout(peer_id, rpc_timeout, transport.send_append_entries(peer_id, request)).await;

            if let Err(e) = event_tx
                .send(RaftEvent::AppendResult {
                    peer_id,
                    request: meta,
                    response,
                })
                .await
            {
                debug!("append result from {} dropped: {:?}", peer_id, e);
            }
        });
    }

    pub(crate) fn spawn_timeout_now(
        &self,
        peer_id: u32,
        current_term: u64,
        transport: &Arc<dyn Transport>,
        event_tx: &mpsc::Sender<RaftEvent>,
        rpc_timeout: Duration,
    ) {
        let request = TimeoutNowRequest {
            term: current_term,
            leader_id: self.my_id,
        };
        let transport = transport.clone();
        let event_tx = event_tx.clone();

        tokio::spawn(async move {
            let response =
                task_with_timeout(peer_id, rpc_timeout, transport.send_timeout_now(peer_id, request)).await;

            if let Err(e) = event_tx
                .send(RaftEvent::TimeoutNowResult {
                    peer_id,
                    request_term: current_term,
                    response,
                })
                .await
            {
                debug!("timeout_now result from {} dropped: {:?}", peer_id, e);
            }
        });
    }
}

impl Debug for ReplicationHandler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ReplicationHandler").field("my_id", &self.my_id).finish()
    }
}
