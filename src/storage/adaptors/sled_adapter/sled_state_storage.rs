use tracing::debug;

use crate::HardState;
use crate::Result;
use crate::StateStorage;
use crate::StorageError;
use crate::STATE_STORAGE_HARD_STATE_KEY;

pub struct SledStateStorage {
    tree: sled::Tree,
}

impl std::fmt::Debug for SledStateStorage {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledStateStorage").finish()
    }
}

impl SledStateStorage {
    pub fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }
}

impl StateStorage for SledStateStorage {
    fn load_hard_state(&self) -> Result<Option<HardState>> {
        match self.tree.get(STATE_STORAGE_HARD_STATE_KEY)? {
            Some(bytes) => {
                let hard_state: HardState = bincode::deserialize(&bytes)?;
                debug!("load_hard_state: {:?}", hard_state);
                Ok(Some(hard_state))
            }
            None => Ok(None),
        }
    }

    fn save_hard_state(
        &self,
        hard_state: HardState,
    ) -> Result<()> {
        let bytes = bincode::serialize(&hard_state)?;
        self.tree.insert(STATE_STORAGE_HARD_STATE_KEY, bytes)?;
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        self.tree
            .flush()
            .map_err(|e| StorageError::StateStorage(e.to_string()))?;
        Ok(())
    }
}
