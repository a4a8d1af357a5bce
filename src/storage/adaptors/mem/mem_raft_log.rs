use std::ops::RangeInclusive;

use parking_lot::RwLock;
use tracing::trace;

use crate::proto::common::Entry;
use crate::proto::common::LogId;
use crate::RaftLog;
use crate::Result;
use crate::StorageError;

/// Volatile log. Clones of the owning `Arc` outlive a killed node, which is
/// how an in-process restart reloads it.
#[derive(Debug, Default)]
pub struct MemRaftLog {
    // entries[i] holds index i + 1
    entries: RwLock<Vec<Entry>>,
}

impl MemRaftLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full copy of the log, for inspection
    pub fn snapshot(&self) -> Vec<Entry> {
        self.entries.read().clone()
    }
}

impl RaftLog for MemRaftLog {
    fn entry(
        &self,
        index: u64,
    ) -> Result<Option<Entry>> {
        if index == 0 {
            return Ok(None);
        }
        Ok(self.entries.read().get((index - 1) as usize).cloned())
    }

    fn last_entry_id(&self) -> u64 {
        self.entries.read().len() as u64
    }

    fn last_log_id(&self) -> LogId {
        self.entries.read().last().map(|e| e.log_id()).unwrap_or_default()
    }

    fn entry_term(
        &self,
        entry_id: u64,
    ) -> Option<u64> {
        if entry_id == 0 {
            return None;
        }
        self.entries.read().get((entry_id - 1) as usize).map(|e| e.term)
    }

    fn first_index_for_term(
        &self,
        term: u64,
    ) -> Option<u64> {
        let entries = self.entries.read();
        // terms never decrease along the log
        let pos = entries.partition_point(|e| e.term < term);
        entries.get(pos).filter(|e| e.term == term).map(|e| e.index)
    }

    fn last_index_for_term(
        &self,
        term: u64,
    ) -> Option<u64> {
        let entries = self.entries.read();
        let pos = entries.partition_point(|e| e.term <= term);
        if pos == 0 {
            return None;
        }
        entries.get(pos - 1).filter(|e| e.term == term).map(|e| e.index)
    }

    fn get_entries_range(
        &self,
        range: RangeInclusive<u64>,
    ) -> Result<Vec<Entry>> {
        let entries = self.entries.read();
        let start = (*range.start()).max(1);
        let end = (*range.end()).min(entries.len() as u64);
        if start > end {
            return Ok(vec![]);
        }
        Ok(entries[(start - 1) as usize..end as usize].to_vec())
    }

    fn append_entries(
        &self,
        new_entries: Vec<Entry>,
    ) -> Result<()> {
        let mut entries = self.entries.write();
        for entry in new_entries {
            let expected = entries.len() as u64 + 1;
            if entry.index != expected {
                return Err(StorageError::LogStorage(format!(
                    "append at index {} leaves a gap, next index is {}",
                    entry.index, expected
                ))
                .into());
            }
            trace!("append entry {:?}", entry.log_id());
            entries.push(entry);
        }
        Ok(())
    }

    fn truncate_suffix(
        &self,
        from_index: u64,
    ) -> Result<()> {
        let mut entries = self.entries.write();
        let keep = from_index.saturating_sub(1) as usize;
        entries.truncate(keep);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}
