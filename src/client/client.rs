use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::time::sleep;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use super::ClientApiError;
use super::ClientConfig;
use super::RaftClientBuilder;
use crate::async_task::backoff_with_jitter;
use crate::proto::client::ClientRequest;
use crate::proto::client::ClientResponse;
use crate::proto::client::CommitResult;
use crate::ClientTransport;

/// One logical client of the replicated log.
///
/// Calls may run concurrently; each takes the next sequence number when it
/// starts and keeps it for all of its retries.
pub struct RaftClient {
    pub(super) client_id: String,
    pub(super) last_sequence: AtomicU64,
    pub(super) members: Vec<u32>,
    pub(super) leader_hint: ArcSwapOption<u32>,
    pub(super) round_robin: AtomicUsize,
    pub(super) transport: Arc<dyn ClientTransport>,
    pub(super) config: ClientConfig,
}

impl RaftClient {
    pub fn builder(
        members: Vec<u32>,
        transport: Arc<dyn ClientTransport>,
    ) -> RaftClientBuilder {
        RaftClientBuilder::new(members, transport)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Sequence number of the most recent submit
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    pub fn leader_hint(&self) -> Option<u32> {
        self.leader_hint.load_full().map(|id| *id)
    }

    /// Submits `command` under the next sequence number and waits for its
    /// commit result.
    pub async fn submit(
        &self,
        command: Vec<u8>,
    ) -> Result<CommitResult, ClientApiError> {
        let sequence = self.last_sequence.fetch_add(1, Ordering::AcqRel) + 1;
        self.submit_request(ClientRequest {
            client_id: self.client_id.clone(),
            sequence,
            command,
        })
        .await
    }

    /// Retry loop of one request.
    ///
    /// A redirect to a node not tried last is followed at once; every other
    /// failure backs off first. Gives up after `retry.max_retries` attempts
    /// or at the overall deadline, whichever comes first.
    pub async fn submit_request(
        &self,
        request: ClientRequest,
    ) -> Result<CommitResult, ClientApiError> {
        let deadline = Instant::now() + self.config.overall_timeout;
        let max_attempts = self.config.retry.max_retries;
        let mut attempt = 0usize;
        let mut last_error = ClientApiError::Timeout;

        loop {
            if max_attempts > 0 && attempt >= max_attempts {
                warn!(
                    "client {} gave up on sequence {} after {} attempts: {}",
                    request.client_id, request.sequence, attempt, last_error
                );
                return Err(last_error);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ClientApiError::Timeout);
            }

            let target = self.pick_target();
            let wait = self.config.request_timeout.min(deadline - now);
            attempt += 1;

            let redirected = match self.transport.propose(target, request.clone(), wait).await {
                Ok(ClientResponse::Committed(result)) => {
                    self.leader_hint.store(Some(Arc::new(target)));
                    return Ok(result);
                }
                Ok(ClientResponse::StaleSequence { last_applied_sequence }) => {
                    warn!(
                        "client {} sequence {} is stale (latest applied {})",
                        request.client_id, request.sequence, last_applied_sequence
                    );
                    return Err(ClientApiError::StaleSequence {
                        client_id: request.client_id,
                        sequence: request.sequence,
                    });
                }
                Ok(ClientResponse::NotLeader { leader_hint }) => {
                    debug!("node {} redirected to {:?}", target, leader_hint);
                    last_error = ClientApiError::NotLeader { leader_hint };
                    match leader_hint {
                        Some(leader) if leader != target => {
                            self.leader_hint.store(Some(Arc::new(leader)));
                            true
                        }
                        _ => {
                            self.leader_hint.store(None);
                            false
                        }
                    }
                }
                Err(e) if e.is_retryable() => {
                    debug!("attempt {} against node {} failed: {}", attempt, target, e);
                    if self.leader_hint() == Some(target) {
                        self.leader_hint.store(None);
                    }
                    last_error = e;
                    false
                }
                Err(e) => return Err(e),
            };

            if !redirected {
                let remaining = deadline.saturating_duration_since(Instant::now());
                sleep(backoff_with_jitter(&self.config.retry, attempt - 1).min(remaining)).await;
            }
        }
    }

    /// Known leader first, otherwise the next member in turn
    fn pick_target(&self) -> u32 {
        if let Some(leader) = self.leader_hint() {
            return leader;
        }
        let next = self.round_robin.fetch_add(1, Ordering::Relaxed);
        self.members[next % self.members.len()]
    }
}

impl std::fmt::Debug for RaftClient {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RaftClient")
            .field("client_id", &self.client_id)
            .field("last_sequence", &self.last_sequence())
            .field("leader_hint", &self.leader_hint())
            .finish()
    }
}
