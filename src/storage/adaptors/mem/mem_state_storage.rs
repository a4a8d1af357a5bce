use parking_lot::Mutex;

use crate::HardState;
use crate::Result;
use crate::StateStorage;

#[derive(Debug, Default)]
pub struct MemStateStorage {
    hard_state: Mutex<Option<HardState>>,
}

impl MemStateStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStorage for MemStateStorage {
    fn load_hard_state(&self) -> Result<Option<HardState>> {
        Ok(*self.hard_state.lock())
    }

    fn save_hard_state(
        &self,
        hard_state: HardState,
    ) -> Result<()> {
        *self.hard_state.lock() = Some(hard_state);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
