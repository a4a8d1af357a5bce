use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::trace;

use crate::proto::client::ClientResponse;

/// A caller waiting for the entry at some index to be applied
#[derive(Debug)]
pub struct Waiter {
    pub request_id: String,
    /// Term of the entry the caller expects at that index
    pub term: u64,
    pub sender: oneshot::Sender<ClientResponse>,
}

/// Wait registrations keyed by log index, removable by request id.
#[derive(Debug, Default)]
pub struct PendingApplies {
    waiters: DashMap<u64, Vec<Waiter>>,
    index_of: DashMap<String, u64>,
}

impl PendingApplies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        index: u64,
        waiter: Waiter,
    ) {
        self.index_of.insert(waiter.request_id.clone(), index);
        self.waiters.entry(index).or_default().push(waiter);
    }

    /// Removes and returns every waiter on `index`
    pub fn take(
        &self,
        index: u64,
    ) -> Vec<Waiter> {
        let waiters = self.waiters.remove(&index).map(|(_, w)| w).unwrap_or_default();
        for w in &waiters {
            self.index_of.remove(&w.request_id);
        }
        waiters
    }

    /// Withdraws one registration. `None` if it was already answered.
    pub fn cancel(
        &self,
        request_id: &str,
    ) -> Option<Waiter> {
        let (_, index) = self.index_of.remove(request_id)?;

        let waiter = {
            let mut entry = self.waiters.get_mut(&index)?;
            let pos = entry.iter().position(|w| w.request_id == request_id)?;
            entry.swap_remove(pos)
        };
        self.waiters.remove_if(&index, |_, v| v.is_empty());

        debug!("cancelled wait of {} on index {}", request_id, index);
        Some(waiter)
    }

    /// Answers every waiter with `response`
    pub fn fail_all(
        &self,
        response: ClientResponse,
    ) {
        let indexes: Vec<u64> = self.waiters.iter().map(|e| *e.key()).collect();
        for index in indexes {
            for waiter in self.take(index) {
                if waiter.sender.send(response.clone()).is_err() {
                    trace!("waiter {} on index {} is gone", waiter.request_id, index);
                }
            }
        }
    }

    /// Number of registered waiters
    pub fn len(&self) -> usize {
        self.index_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_of.is_empty()
    }
}
