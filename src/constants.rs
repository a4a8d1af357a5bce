// Role codes published in `RaftStatus::role`
pub const FOLLOWER: i32 = 0;
pub const CANDIDATE: i32 = 1;
pub const LEADER: i32 = 2;

/// Sled database tree namespaces
pub(crate) const RAFT_LOG_TREE: &str = "_raft_log";
pub(crate) const STATE_STORAGE_TREE: &str = "_state_storage";

/// Sled entry key namespaces
pub(crate) const STATE_STORAGE_HARD_STATE_KEY: &str = "_state_storage_hard_state";

/// Bounded capacity of the per-node raft event channel
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 1024;
