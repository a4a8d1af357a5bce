use tokio::sync::oneshot;

use crate::proto::client::ClientRequest;
use crate::proto::client::ClientResponse;
use crate::proto::election::TimeoutNowRequest;
use crate::proto::election::TimeoutNowResponse;
use crate::proto::election::VoteRequest;
use crate::proto::election::VoteResponse;
use crate::proto::replication::AppendEntriesRequest;
use crate::proto::replication::AppendEntriesResponse;
use crate::Result;

#[derive(Debug)]
pub enum RoleEvent {
    BecomeFollower(Option<u32>), // BecomeFollower(Option<leader_id>)
    BecomeCandidate,
    BecomeLeader,

    NotifyNewCommitIndex { new_commit_index: u64 },
    ReprocessEvent(Box<RaftEvent>), //Replay the raft event when step down as another role
}

/// A client request as seen by the event loop. `request_id` identifies the
/// wait registration so the caller can withdraw it on timeout.
#[derive(Debug, Clone)]
pub struct ClientProposal {
    pub request: ClientRequest,
    pub request_id: String,
}

/// Identifies the AppendEntries request an `AppendResult` answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendRequestMeta {
    pub term: u64,
    pub prev_log_index: u64,
    pub entries_len: u64,
}

#[derive(Debug)]
pub enum RaftEvent {
    //--- Inbound RPCs
    ReceiveVoteRequest(VoteRequest, oneshot::Sender<Result<VoteResponse>>),

    AppendEntries(AppendEntriesRequest, oneshot::Sender<Result<AppendEntriesResponse>>),

    TimeoutNow(TimeoutNowRequest, oneshot::Sender<Result<TimeoutNowResponse>>),

    ClientPropose(ClientProposal, oneshot::Sender<ClientResponse>),

    TransferLeadership(u32, oneshot::Sender<Result<()>>),

    //--- Outcomes of requests this node sent
    VoteResult {
        peer_id: u32,
        request_term: u64,
        response: Result<VoteResponse>,
    },

    AppendResult {
        peer_id: u32,
        request: AppendRequestMeta,
        response: Result<AppendEntriesResponse>,
    },

    TimeoutNowResult {
        peer_id: u32,
        request_term: u64,
        response: Result<TimeoutNowResponse>,
    },
}
