//! Core model in Raft: RaftLog Definition
//!
//! Indices are 1-based and contiguous. Index 0 is the virtual entry before
//! the first one; its term is 0.

use std::ops::RangeInclusive;

#[cfg(test)]
use mockall::automock;
use tracing::debug;
use tracing::warn;

use crate::proto::common::Entry;
use crate::proto::common::LogId;
use crate::ReplicationError;
use crate::Result;

#[cfg_attr(test, automock)]
pub trait RaftLog: Send + Sync + 'static {
    fn entry(
        &self,
        index: u64,
    ) -> Result<Option<Entry>>;

    /// 0 when the log is empty
    fn last_entry_id(&self) -> u64;

    /// `LogId { index: 0, term: 0 }` when the log is empty
    fn last_log_id(&self) -> LogId;

    fn entry_term(
        &self,
        entry_id: u64,
    ) -> Option<u64>;

    fn first_index_for_term(
        &self,
        term: u64,
    ) -> Option<u64>;

    fn last_index_for_term(
        &self,
        term: u64,
    ) -> Option<u64>;

    fn get_entries_range(
        &self,
        range: RangeInclusive<u64>,
    ) -> Result<Vec<Entry>>;

    /// Appends entries that continue the log without a gap. Durable once
    /// this returns.
    fn append_entries(
        &self,
        entries: Vec<Entry>,
    ) -> Result<()>;

    /// Removes `from_index` and everything after it
    fn truncate_suffix(
        &self,
        from_index: u64,
    ) -> Result<()>;

    fn flush(&self) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Term at `index`, treating index 0 as term 0
    fn prev_log_term(
        &self,
        index: u64,
    ) -> Option<u64> {
        if index == 0 {
            Some(0)
        } else {
            self.entry_term(index)
        }
    }

    /// Log-matching check followed by conflict-aware append.
    ///
    /// Returns `None` if the log does not hold `prev_log_term` at
    /// `prev_log_index`. Otherwise entries already present with the same
    /// term are skipped, the first conflicting entry and everything after it
    /// are truncated, and the remainder is appended. The returned index is
    /// the last one covered by the request (`prev_log_index + len`), which
    /// is what the leader may record as matched.
    ///
    /// A conflict at or below `commit_index` is refused.
    fn filter_out_conflicts_and_append(
        &self,
        prev_log_index: u64,
        prev_log_term: u64,
        new_entries: Vec<Entry>,
        commit_index: u64,
    ) -> Result<Option<u64>> {
        match self.prev_log_term(prev_log_index) {
            Some(term) if term == prev_log_term => {}
            other => {
                debug!(
                    "log mismatch at prev_log_index={}: expected term {}, found {:?}",
                    prev_log_index, prev_log_term, other
                );
                return Ok(None);
            }
        }

        let match_index = prev_log_index + new_entries.len() as u64;

        let mut first_new = new_entries.len();
        for (pos, entry) in new_entries.iter().enumerate() {
            match self.entry_term(entry.index) {
                Some(term) if term == entry.term => continue,
                Some(term) => {
                    if entry.index <= commit_index {
                        warn!(
                            "conflict at committed index {} (local term {}, leader term {})",
                            entry.index, term, entry.term
                        );
                        return Err(ReplicationError::CommittedEntryConflict {
                            index: entry.index,
                            commit_index,
                        }
                        .into());
                    }
                    debug!("truncating conflicting suffix from {}", entry.index);
                    self.truncate_suffix(entry.index)?;
                    first_new = pos;
                    break;
                }
                None => {
                    first_new = pos;
                    break;
                }
            }
        }

        if first_new < new_entries.len() {
            let to_append: Vec<Entry> = new_entries.into_iter().skip(first_new).collect();
            self.append_entries(to_append)?;
        }

        Ok(Some(match_index))
    }

    /// Highest index replicated on a majority (leader included) that may be
    /// committed now.
    ///
    /// Only an entry of `current_term` is committed by counting replicas.
    /// Earlier entries become committed through it.
    fn calculate_majority_matched_index(
        &self,
        current_term: u64,
        commit_index: u64,
        mut peer_matched_ids: Vec<u64>,
    ) -> Option<u64> {
        peer_matched_ids.push(self.last_entry_id());
        peer_matched_ids.sort_unstable_by(|a, b| b.cmp(a));

        let majority_index = peer_matched_ids.len() / 2;
        let majority_matched_index = *peer_matched_ids.get(majority_index)?;

        debug!(
            "Majority calculation: matched={:?}, majority_index={}, value={}",
            peer_matched_ids, majority_index, majority_matched_index
        );

        if majority_matched_index > commit_index {
            if let Some(term) = self.entry_term(majority_matched_index) {
                if term == current_term {
                    return Some(majority_matched_index);
                }
            }
        }

        None
    }
}
