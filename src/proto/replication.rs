use serde::Deserialize;
use serde::Serialize;

use super::common::Entry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: u64,
    pub leader_id: u32,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<Entry>,
    pub leader_commit_index: u64,
}

/// Hint returned with a failed log-matching check.
///
/// `conflict_term` is the term the follower holds at `prev_log_index`
/// (None if its log is shorter) and `conflict_index` the first index the
/// follower holds for that term, or its `last_index + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictHint {
    pub conflict_index: u64,
    pub conflict_term: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub node_id: u32,
    pub term: u64,
    pub success: bool,
    /// Highest index known to match the leader's log. Meaningful on success.
    pub match_index: u64,
    pub conflict: Option<ConflictHint>,
}

impl AppendEntriesResponse {
    pub fn success(
        node_id: u32,
        term: u64,
        match_index: u64,
    ) -> Self {
        Self {
            node_id,
            term,
            success: true,
            match_index,
            conflict: None,
        }
    }

    pub fn conflict(
        node_id: u32,
        term: u64,
        hint: ConflictHint,
    ) -> Self {
        Self {
            node_id,
            term,
            success: false,
            match_index: 0,
            conflict: Some(hint),
        }
    }

    pub fn higher_term(
        node_id: u32,
        term: u64,
    ) -> Self {
        Self {
            node_id,
            term,
            success: false,
            match_index: 0,
            conflict: None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        !self.success && self.conflict.is_some()
    }
}
