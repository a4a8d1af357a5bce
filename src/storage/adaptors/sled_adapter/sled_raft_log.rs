use std::ops::RangeInclusive;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use sled::Batch;
use tracing::debug;
use tracing::error;

use crate::convert::safe_kv;
use crate::convert::safe_vk;
use crate::proto::common::Entry;
use crate::proto::common::LogId;
use crate::RaftLog;
use crate::Result;
use crate::StorageError;

/// Log entries in one sled tree, keyed by big-endian index, bincode values.
/// Every mutation is flushed before returning.
pub struct SledRaftLog {
    tree: sled::Tree,
    last_index: AtomicU64,
}

impl std::fmt::Debug for SledRaftLog {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledRaftLog")
            .field("last_index", &self.last_index.load(Ordering::Acquire))
            .finish()
    }
}

impl SledRaftLog {
    pub fn new(tree: sled::Tree) -> Result<Self> {
        let last_index = match tree.last()? {
            Some((key, _)) => safe_vk(key)?,
            None => 0,
        };
        debug!("SledRaftLog opened with last index {}", last_index);
        Ok(Self {
            tree,
            last_index: AtomicU64::new(last_index),
        })
    }

    fn decode(bytes: &[u8]) -> Result<Entry> {
        Ok(bincode::deserialize(bytes)?)
    }

    fn sync(&self) -> Result<()> {
        self.tree.flush().map_err(|e| {
            error!("SledRaftLog flush failed: {:?}", e);
            StorageError::DbError(e.to_string())
        })?;
        Ok(())
    }
}

impl RaftLog for SledRaftLog {
    fn entry(
        &self,
        index: u64,
    ) -> Result<Option<Entry>> {
        match self.tree.get(safe_kv(index))? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn last_entry_id(&self) -> u64 {
        self.last_index.load(Ordering::Acquire)
    }

    fn last_log_id(&self) -> LogId {
        let index = self.last_entry_id();
        LogId {
            index,
            term: self.entry_term(index).unwrap_or(0),
        }
    }

    fn entry_term(
        &self,
        entry_id: u64,
    ) -> Option<u64> {
        if entry_id == 0 {
            return None;
        }
        match self.entry(entry_id) {
            Ok(e) => e.map(|e| e.term),
            Err(e) => {
                error!("entry_term({}) failed: {:?}", entry_id, e);
                None
            }
        }
    }

    fn first_index_for_term(
        &self,
        term: u64,
    ) -> Option<u64> {
        self.tree
            .iter()
            .values()
            .filter_map(|v| v.ok())
            .filter_map(|v| Self::decode(&v).ok())
            .find(|e| e.term >= term)
            .filter(|e| e.term == term)
            .map(|e| e.index)
    }

    fn last_index_for_term(
        &self,
        term: u64,
    ) -> Option<u64> {
        self.tree
            .iter()
            .values()
            .rev()
            .filter_map(|v| v.ok())
            .filter_map(|v| Self::decode(&v).ok())
            .find(|e| e.term <= term)
            .filter(|e| e.term == term)
            .map(|e| e.index)
    }

    fn get_entries_range(
        &self,
        range: RangeInclusive<u64>,
    ) -> Result<Vec<Entry>> {
        let start = safe_kv(*range.start());
        let end = safe_kv(*range.end());
        let mut entries = Vec::new();
        for item in self.tree.range(start..=end) {
            let (_, value) = item?;
            entries.push(Self::decode(&value)?);
        }
        Ok(entries)
    }

    fn append_entries(
        &self,
        entries: Vec<Entry>,
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut expected = self.last_entry_id() + 1;
        let mut batch = Batch::default();
        for entry in &entries {
            if entry.index != expected {
                return Err(StorageError::LogStorage(format!(
                    "append at index {} leaves a gap, next index is {}",
                    entry.index, expected
                ))
                .into());
            }
            batch.insert(safe_kv(entry.index).to_vec(), bincode::serialize(entry)?);
            expected += 1;
        }
        self.tree.apply_batch(batch)?;
        self.sync()?;
        self.last_index.store(expected - 1, Ordering::Release);
        Ok(())
    }

    fn truncate_suffix(
        &self,
        from_index: u64,
    ) -> Result<()> {
        let mut batch = Batch::default();
        for key in self.tree.range(safe_kv(from_index)..).keys() {
            batch.remove(key?);
        }
        self.tree.apply_batch(batch)?;
        self.sync()?;
        let last = self.last_entry_id().min(from_index.saturating_sub(1));
        self.last_index.store(last, Ordering::Release);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.sync()
    }

    fn len(&self) -> usize {
        self.tree.len()
    }
}
