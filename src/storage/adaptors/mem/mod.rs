mod mem_raft_log;
mod mem_state_machine;
mod mem_state_storage;

pub use mem_raft_log::*;
pub use mem_state_machine::*;
pub use mem_state_storage::*;
