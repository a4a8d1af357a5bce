mod sled_raft_log;
mod sled_state_storage;

pub use sled_raft_log::*;
pub use sled_state_storage::*;


use std::path::Path;

use tracing::debug;
use tracing::warn;

use crate::Result;
use crate::RAFT_LOG_TREE;
use crate::STATE_STORAGE_TREE;

/// Opens (or creates) the node database under `sled_db_root_path` and
/// returns the log and hard-state stores backed by it.
pub fn init_sled_storages(
    sled_db_root_path: impl AsRef<Path> + std::fmt::Debug
) -> Result<(SledRaftLog, SledStateStorage)> {
    debug!("init_sled_storages from path: {:?}", &sled_db_root_path);

    let db = init_sled_db(&sled_db_root_path)?;
    let log_tree = db.open_tree(RAFT_LOG_TREE)?;
    let state_tree = db.open_tree(STATE_STORAGE_TREE)?;

    Ok((SledRaftLog::new(log_tree)?, SledStateStorage::new(state_tree)))
}

pub fn init_sled_db(sled_db_root_path: impl AsRef<Path> + std::fmt::Debug) -> Result<sled::Db> {
    let path = sled_db_root_path.as_ref().join("raft");

    sled::Config::default()
        .path(&path)
        .cache_capacity(64 * 1024 * 1024) //64MB
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!("Try to open DB at this location: {:?} and failed: {:?}", path, e);
            e.into()
        })
}
