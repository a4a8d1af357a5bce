mod replication_handler;

pub use replication_handler::*;


use crate::proto::replication::AppendEntriesResponse;

/// Follower side outcome of an AppendEntries request
#[derive(Debug)]
pub struct AppendResponseWithUpdates {
    pub response: AppendEntriesResponse,
    /// Commit_index to be updated
    pub commit_index_update: Option<u64>,
}
