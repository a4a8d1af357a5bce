mod client_sessions;
mod default_commit_handler;
mod pending_applies;

pub use client_sessions::*;
pub use default_commit_handler::*;
pub use pending_applies::*;


#[cfg(test)]
use mockall::automock;
use async_trait::async_trait;

use crate::Result;

/// Drives committed entries into the state machine.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommitHandler: Send + Sync + 'static {
    /// Runs until shutdown. Returns `Err` only on a fatal apply failure.
    async fn run(&mut self) -> Result<()>;
}
