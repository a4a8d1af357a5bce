mod election_handler;
pub use election_handler::*;


use crate::proto::election::VotedFor;

/// Changes to the hard state a vote request asks for. The caller persists
/// them before answering the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateUpdate {
    /// Set when the vote is granted
    pub new_voted_for: Option<VotedFor>,
    /// Set when the request carries a term newer than ours
    pub term_update: Option<u64>,
}

impl StateUpdate {
    pub fn vote_granted(&self) -> bool {
        self.new_voted_for.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.new_voted_for.is_none() && self.term_update.is_none()
    }
}
