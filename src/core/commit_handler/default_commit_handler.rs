use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use super::ClientSessions;
use super::CommitHandler;
use super::PendingApplies;
use super::SessionCheck;
use crate::proto::client::ClientResponse;
use crate::proto::client::CommitResult;
use crate::proto::common::Entry;
use crate::proto::common::EntryPayload;
use crate::Error;
use crate::RaftLog;
use crate::Result;
use crate::StateMachine;
use crate::COMMITTED_ENTRIES_METRIC;

/// Applies committed entries in log order and answers the callers waiting
/// on them.
pub struct DefaultCommitHandler {
    node_id: u32,
    raft_log: Arc<dyn RaftLog>,
    state_machine: Arc<dyn StateMachine>,
    sessions: Arc<ClientSessions>,
    pending: Arc<PendingApplies>,
    last_applied: Arc<AtomicU64>,
    pub(super) commit_index: u64,
    new_commit_rx: Option<mpsc::UnboundedReceiver<u64>>,
    batch_size: u64,
    process_interval_ms: u64,
    // Shutdown signal
    shutdown_signal: watch::Receiver<()>,
}

#[async_trait]
impl CommitHandler for DefaultCommitHandler {
    async fn run(&mut self) -> Result<()> {
        let mut interval = self.dynamic_interval();
        let mut new_commit_rx = self
            .new_commit_rx
            .take()
            .ok_or_else(|| Error::Fatal("commit handler started twice".to_string()))?;
        let mut shutdown_signal = self.shutdown_signal.clone();

        loop {
            tokio::select! {
                biased;
                // P0: shutdown received;
                _ = shutdown_signal.changed() => {
                    warn!("[CommitHandler:{}] shutdown signal received.", self.node_id);
                    if let Err(e) = self.state_machine.flush() {
                        error!("state machine flush failed: {:?}", e);
                    }
                    return Ok(());
                }

                // Commit signals from the event loop
                Some(new_commit) = new_commit_rx.recv() => {
                    trace!("new commit index: {}", new_commit);
                    if new_commit > self.commit_index {
                        self.commit_index = new_commit;
                    }
                }

                // Scheduled batch processing
                _ = interval.tick() => {}
            }

            self.process_batch()?;
        }
    }
}

impl DefaultCommitHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: u32,
        raft_log: Arc<dyn RaftLog>,
        state_machine: Arc<dyn StateMachine>,
        sessions: Arc<ClientSessions>,
        pending: Arc<PendingApplies>,
        last_applied: Arc<AtomicU64>,
        new_commit_rx: mpsc::UnboundedReceiver<u64>,
        batch_size: u64,
        process_interval_ms: u64,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            node_id,
            raft_log,
            state_machine,
            sessions,
            pending,
            last_applied,
            commit_index: 0,
            new_commit_rx: Some(new_commit_rx),
            batch_size,
            process_interval_ms,
            shutdown_signal,
        }
    }

    /// Applies up to `batch_size` committed entries. A state machine or log
    /// read failure is fatal: applying out of order is never an option.
    pub(crate) fn process_batch(&mut self) -> Result<()> {
        let last_applied = self.last_applied.load(Ordering::Acquire);
        if self.commit_index <= last_applied {
            return Ok(());
        }

        let upper = self.commit_index.min(last_applied + self.batch_size);
        let entries = self
            .raft_log
            .get_entries_range(last_applied + 1..=upper)
            .map_err(|e| Error::Fatal(format!("read committed entries failed: {}", e)))?;

        debug!(
            "[CommitHandler:{}] applying {}..={} ({} entries)",
            self.node_id,
            last_applied + 1,
            upper,
            entries.len()
        );

        for entry in entries {
            self.apply_entry(entry)?;
        }
        Ok(())
    }

    fn apply_entry(
        &self,
        entry: Entry,
    ) -> Result<()> {
        let index = entry.index;
        let term = entry.term;

        let result = match &entry.payload {
            EntryPayload::Noop => None,
            EntryPayload::Command(command) => match self.sessions.check(&command.client_id, command.sequence) {
                SessionCheck::Applied(cached) => {
                    debug!(
                        "({}, {}) already applied at {}, skip index {}",
                        command.client_id, command.sequence, cached.index, index
                    );
                    Some(cached)
                }
                SessionCheck::Stale { .. } => {
                    warn!(
                        "({}, {}) at index {} is older than the session window, skipped",
                        command.client_id, command.sequence, index
                    );
                    None
                }
                SessionCheck::New => {
                    let output = self
                        .state_machine
                        .apply(index, term, &command.data)
                        .map_err(|e| Error::Fatal(format!("apply index {} failed: {}", index, e)))?;
                    let result = CommitResult {
                        term,
                        index,
                        result: output,
                    };
                    self.sessions.record(&command.client_id, command.sequence, result.clone());
                    Some(result)
                }
            },
        };

        self.last_applied.store(index, Ordering::Release);
        COMMITTED_ENTRIES_METRIC
            .with_label_values(&[&self.node_id.to_string()])
            .inc();

        for waiter in self.pending.take(index) {
            let response = match (&result, waiter.term == term) {
                (Some(r), true) => ClientResponse::Committed(r.clone()),
                _ => ClientResponse::NotLeader { leader_hint: None },
            };
            if waiter.sender.send(response).is_err() {
                trace!("waiter {} on index {} is gone", waiter.request_id, index);
            }
        }

        Ok(())
    }

    /// Dynamically adjusted timer
    /// Behavior: If multiple ticks are missed, the timer will wait for the next
    /// tick instead of firing immediately.
    pub(crate) fn dynamic_interval(&self) -> tokio::time::Interval {
        let mut interval = tokio::time::interval(Duration::from_millis(self.process_interval_ms));
        debug!("process_interval_ms: {}", self.process_interval_ms);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    }
}
