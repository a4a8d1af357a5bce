//! Raft Consensus Protocol Error Hierarchy
//!
//! Errors are grouped by protocol layer. Only `Error::Fatal` stops a node;
//! everything else is handled by the owning module and retried on the next
//! timer tick.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

use crate::proto::replication::ConflictHint;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (network, storage, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Raft consensus protocol violations and failures
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// Unrecoverable failures. The node stops instead of continuing with
    /// possibly-lost durable state.
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    /// Illegal Raft node state transitions
    #[error(transparent)]
    StateTransition(#[from] StateTransitionError),

    /// Leader election failures (Section 5.2 Raft paper)
    #[error(transparent)]
    Election(#[from] ElectionError),

    /// Log replication failures (Section 5.3 Raft paper)
    #[error(transparent)]
    Replication(#[from] ReplicationError),

    /// Operation only a leader may perform
    #[error("Node is not the leader (known leader: {leader_id:?})")]
    NotLeader { leader_id: Option<u32> },
}

#[derive(Debug, thiserror::Error)]
#[doc(hidden)]
pub enum StateTransitionError {
    #[error("Not enough votes to transition to leader.")]
    NotEnoughVotes,

    #[error("Invalid state transition.")]
    InvalidTransition,
}

#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    /// A peer answered with a newer term (StaleTerm)
    #[error("Found higher term(={0}) during election process")]
    HigherTerm(u64),

    /// Not enough grants in the candidate's term (NoQuorum)
    #[error("Quorum not reached (required: {required}, succeed: {succeed})")]
    QuorumFailure { required: usize, succeed: usize },

    #[error("Leadership transfer to {target} already in progress")]
    TransferInProgress { target: u32 },

    #[error("Node {target} cannot receive leadership")]
    InvalidTransferTarget { target: u32 },

    #[error("Leadership transfer to {target} did not complete within {duration:?}")]
    TransferTimeout { target: u32, duration: Duration },

    #[error("Node {target} rejected TimeoutNow in term {term}")]
    TransferRejected { target: u32, term: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// A follower answered with a newer term (StaleTerm)
    #[error("Found higher term(={0}) during replication process")]
    HigherTerm(u64),

    /// Follower log failed the prev-log check (LogInconsistency)
    #[error("Log conflict after index {prev_log_index} (follower hint {hint:?})")]
    LogConflict { prev_log_index: u64, hint: ConflictHint },

    /// A leader asked to truncate an entry this node already committed
    #[error("Refusing to truncate committed index {index} (commit index {commit_index})")]
    CommittedEntryConflict { index: u64, commit_index: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Peer is not registered or its event loop is gone (NodeUnavailable)
    #[error("Node {node_id} is unavailable")]
    NodeUnavailable { node_id: u32 },

    /// Outbound traffic of `from` is blocked
    #[error("Traffic from node {from} to node {to} is blocked")]
    RequestBlocked { from: u32, to: u32 },

    /// Peer communication timeout
    #[error("Request to {node_id} timed out after {duration:?}")]
    Timeout { node_id: u32, duration: Duration },

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSendFailed(String),

}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Serialization failures for persisted data
    #[error(transparent)]
    BincodeError(#[from] bincode::Error),

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(String),

    /// Log storage subsystem failures
    #[error("Log storage failure: {0}")]
    LogStorage(String),

    /// Term/vote storage failures
    #[error("State storage failure: {0}")]
    StateStorage(String),

    /// State machine application errors
    #[error("State Machine error: {0}")]
    StateMachineError(String),

    /// Error type for value conversion operations
    #[error("Value convert failed")]
    Convert(#[from] ConvertError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("invalid byte length: expected 8 bytes, received {0} bytes")]
    InvalidLength(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Node failed to start: {0}")]
    NodeStartFailed(String),
}

impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<ElectionError> for Error {
    fn from(e: ElectionError) -> Self {
        Error::Consensus(ConsensusError::Election(e))
    }
}

impl From<ReplicationError> for Error {
    fn from(e: ReplicationError) -> Self {
        Error::Consensus(ConsensusError::Replication(e))
    }
}

impl From<StateTransitionError> for Error {
    fn from(e: StateTransitionError) -> Self {
        Error::Consensus(ConsensusError::StateTransition(e))
    }
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        StorageError::DbError(e.to_string()).into()
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        StorageError::BincodeError(e).into()
    }
}

impl Error {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }

    /// Durable state could not be written. The node must stop.
    pub(crate) fn persistence(
        what: &str,
        e: Error,
    ) -> Self {
        Error::Fatal(format!("failed to persist {}: {}", what, e))
    }
}
