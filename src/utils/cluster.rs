use crate::CANDIDATE;
use crate::FOLLOWER;
use crate::LEADER;

/// Quorum size of a cluster with `total_nodes` voters: ⌊N/2⌋ + 1
pub fn majority_count(total_nodes: usize) -> usize {
    (total_nodes / 2) + 1
}

pub fn role_name(role_i32: i32) -> &'static str {
    match role_i32 {
        FOLLOWER => "Follower",
        CANDIDATE => "Candidate",
        LEADER => "Leader",
        _ => "Unknown",
    }
}
