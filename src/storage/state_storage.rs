//! Core model in Raft: StateStorage Definition, persistent state: current_term and voted_for
use crate::HardState;
use crate::Result;

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
pub trait StateStorage: Send + Sync + 'static {
    /// When node restarts, check if there is stored state from disk
    fn load_hard_state(&self) -> Result<Option<HardState>>;

    /// Save role hard state. Durable once this returns.
    fn save_hard_state(
        &self,
        hard_state: HardState,
    ) -> Result<()>;

    fn flush(&self) -> Result<()>;
}
