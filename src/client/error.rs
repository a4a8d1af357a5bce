/// Errors a caller of the client gateway can see
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientApiError {
    /// The contacted node does not lead; `leader_hint` is its best guess
    #[error("Node is not the leader (hint: {leader_hint:?})")]
    NotLeader { leader_hint: Option<u32> },

    /// No answer within the request or overall deadline. The command may
    /// still commit later.
    #[error("Request timed out")]
    Timeout,

    /// Node is down, isolated or not registered
    #[error("Node {node_id} is unavailable")]
    Unavailable { node_id: u32 },

    /// The sequence fell out of the cluster's dedup window for this client
    #[error("Sequence {sequence} of client {client_id} is older than its applied window")]
    StaleSequence { client_id: String, sequence: u64 },

    #[error("Server error: {0}")]
    Server(String),
}

impl ClientApiError {
    /// Whether trying again, possibly elsewhere, can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientApiError::NotLeader { .. } | ClientApiError::Timeout | ClientApiError::Unavailable { .. }
        )
    }
}
