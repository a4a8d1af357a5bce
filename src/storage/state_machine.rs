use crate::Result;

#[cfg(test)]
use mockall::automock;

/// Application driven by committed commands.
///
/// Commands reach `apply` in log order, exactly once per (client, sequence)
/// during the life of the instance. A state machine handed to a restarted
/// node may keep its state; `last_applied` tells the node where to resume.
#[cfg_attr(test, automock)]
pub trait StateMachine: Send + Sync + 'static {
    fn apply(
        &self,
        index: u64,
        term: u64,
        command: &[u8],
    ) -> Result<Vec<u8>>;

    fn last_applied(&self) -> u64;

    /// Output `apply` returned for `index`, if the state machine still has
    /// it. Used to answer retries of commands applied before a restart.
    fn applied_output(
        &self,
        _index: u64,
    ) -> Option<Vec<u8>> {
        None
    }

    fn flush(&self) -> Result<()>;
}
