use serde::Deserialize;
use serde::Serialize;

use super::common::ClientCommand;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
    pub client_id: String,
    /// Per-client, strictly increasing. Retransmissions reuse it.
    pub sequence: u64,
    pub command: Vec<u8>,
}

impl ClientRequest {
    pub fn into_command(self) -> ClientCommand {
        ClientCommand {
            client_id: self.client_id,
            sequence: self.sequence,
            data: self.command,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    pub term: u64,
    pub index: u64,
    pub result: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientResponse {
    Committed(CommitResult),
    NotLeader { leader_hint: Option<u32> },
    /// The sequence is older than the latest one applied for this client
    StaleSequence { last_applied_sequence: u64 },
}
