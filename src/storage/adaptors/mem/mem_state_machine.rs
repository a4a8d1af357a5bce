use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use parking_lot::RwLock;
use tracing::trace;

use crate::Result;
use crate::StateMachine;
use crate::StorageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCommand {
    pub index: u64,
    pub term: u64,
    pub data: Vec<u8>,
}

/// Records every applied command and answers with the command bytes.
#[derive(Debug, Default)]
pub struct MemStateMachine {
    applied: RwLock<Vec<AppliedCommand>>,
    last_applied_index: AtomicU64,
}

impl MemStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> Vec<AppliedCommand> {
        self.applied.read().clone()
    }
}

impl StateMachine for MemStateMachine {
    fn apply(
        &self,
        index: u64,
        term: u64,
        command: &[u8],
    ) -> Result<Vec<u8>> {
        let last = self.last_applied_index.load(Ordering::Acquire);
        if index <= last {
            return Err(StorageError::StateMachineError(format!(
                "index {} already applied (last applied {})",
                index, last
            ))
            .into());
        }
        trace!("apply index {} term {}", index, term);
        self.applied.write().push(AppliedCommand {
            index,
            term,
            data: command.to_vec(),
        });
        self.last_applied_index.store(index, Ordering::Release);
        Ok(command.to_vec())
    }

    fn last_applied(&self) -> u64 {
        self.last_applied_index.load(Ordering::Acquire)
    }

    fn applied_output(
        &self,
        index: u64,
    ) -> Option<Vec<u8>> {
        self.applied
            .read()
            .iter()
            .find(|a| a.index == index)
            .map(|a| a.data.clone())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
