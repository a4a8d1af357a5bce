use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::sleep_until;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::RaftContext;
use super::RaftEvent;
use super::RaftRole;
use super::RoleEvent;
use crate::Result;

/// Point-in-time view of a node, published after every event the loop
/// handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RaftStatus {
    pub node_id: u32,
    pub role: i32,
    pub current_term: u64,
    pub leader_id: Option<u32>,
    pub commit_index: u64,
    pub last_log_index: u64,
    pub last_applied: u64,
}

/// The per-node event loop. Owns the role; everything that changes term,
/// vote, role or log goes through here one event at a time.
pub struct Raft {
    pub node_id: u32,
    pub role: RaftRole,
    pub ctx: RaftContext,

    pub(crate) event_tx: mpsc::Sender<RaftEvent>,
    event_rx: mpsc::Receiver<RaftEvent>,

    pub(crate) role_tx: mpsc::UnboundedSender<RoleEvent>,
    role_rx: mpsc::UnboundedReceiver<RoleEvent>,

    new_commit_listener: Vec<mpsc::UnboundedSender<u64>>,

    status_tx: watch::Sender<RaftStatus>,

    shutdown_signal: watch::Receiver<()>,
}

impl Raft {
    /// Reloads term and vote from stable storage and starts as follower.
    pub(crate) fn new(
        ctx: RaftContext,
        event_tx: mpsc::Sender<RaftEvent>,
        event_rx: mpsc::Receiver<RaftEvent>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<Self> {
        let node_id = ctx.node_id;
        let hard_state = ctx.state_storage().load_hard_state()?;
        info!(
            "[Raft:{}] reloaded hard state {:?}, last log {:?}",
            node_id,
            hard_state,
            ctx.raft_log().last_log_id()
        );

        let role = RaftRole::initial(node_id, hard_state, ctx.last_applied(), ctx.settings());
        let (role_tx, role_rx) = mpsc::unbounded_channel();
        let (status_tx, _status_rx) = watch::channel(RaftStatus {
            node_id,
            ..Default::default()
        });

        let raft = Raft {
            node_id,
            role,
            ctx,
            event_tx,
            event_rx,
            role_tx,
            role_rx,
            new_commit_listener: Vec::new(),
            status_tx,
            shutdown_signal,
        };
        raft.publish_status();
        Ok(raft)
    }

    pub fn register_new_commit_listener(
        &mut self,
        tx: mpsc::UnboundedSender<u64>,
    ) {
        self.new_commit_listener.push(tx);
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RaftStatus> {
        self.status_tx.subscribe()
    }

    /// Runs until shutdown or a fatal error.
    ///
    /// Role events are drained before ticks and inbound events, so a role
    /// that asked to step down never acts on another event first.
    pub async fn run(&mut self) -> Result<()> {
        if self.role.is_timer_expired() {
            self.role.reset_timer();
        }

        loop {
            let tick = sleep_until(self.role.next_deadline());
            tokio::select! {
                biased;
                _ = self.shutdown_signal.changed() => {
                    warn!("[Raft:{}] shutdown signal received.", self.node_id);
                    self.flush_storage();
                    return Ok(());
                }

                Some(role_event) = self.role_rx.recv() => {
                    debug!("[Raft:{}] receive role event: {:?}", self.node_id, role_event);
                    let result = self.handle_role_event(role_event).await;
                    self.check_result("handle_role_event", result)?;
                }

                _ = tick => {
                    trace!("receive tick");
                    let result = self.role.tick(&self.role_tx, &self.event_tx, &self.ctx).await;
                    self.check_result("tick", result)?;
                }

                Some(raft_event) = self.event_rx.recv() => {
                    trace!("[Raft:{}] receive raft event: {:?}", self.node_id, raft_event);
                    let result = self.role.handle_raft_event(raft_event, &self.ctx, &self.role_tx, &self.event_tx).await;
                    self.check_result("handle_raft_event", result)?;
                }
            }

            self.publish_status();
        }
    }

    /// Fatal errors end the loop, everything else is logged.
    fn check_result(
        &self,
        what: &str,
        result: Result<()>,
    ) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => {
                error!("[Raft:{}] {} failed fatally, stopping: {}", self.node_id, what, e);
                Err(e)
            }
            Err(e) => {
                warn!("[Raft:{}] {} failed: {:?}", self.node_id, what, e);
                Ok(())
            }
        }
    }

    pub(crate) async fn handle_role_event(
        &mut self,
        role_event: RoleEvent,
    ) -> Result<()> {
        match role_event {
            RoleEvent::BecomeFollower(leader_id_option) => {
                match leader_id_option {
                    Some(leader_id) => self.ctx.cluster().mark_leader_id(leader_id),
                    None => self.ctx.cluster().reset_leader(),
                }
                if self.role.is_follower() {
                    return Ok(());
                }
                self.role.state_mut().on_step_down(&self.ctx, leader_id_option);
                self.role = self.role.become_follower()?;
            }
            RoleEvent::BecomeCandidate => {
                self.role = self.role.become_candidate()?;
                if let RaftRole::Candidate(candidate) = &mut self.role {
                    candidate.start_election(&self.ctx, &self.role_tx, &self.event_tx)?;
                }
            }
            RoleEvent::BecomeLeader => {
                self.role = self.role.become_leader()?;
                if let RaftRole::Leader(leader) = &mut self.role {
                    leader.on_elected(&self.ctx, &self.role_tx, &self.event_tx)?;
                }
            }
            RoleEvent::NotifyNewCommitIndex { new_commit_index } => {
                debug!(
                    "[{}] RoleEvent::NotifyNewCommitIndex: {:?}",
                    self.node_id, new_commit_index
                );
                self.notify_new_commit(new_commit_index);
            }
            RoleEvent::ReprocessEvent(raft_event) => {
                debug!("Replay the RaftEvent: {:?}", &raft_event);
                self.role
                    .handle_raft_event(*raft_event, &self.ctx, &self.role_tx, &self.event_tx)
                    .await?;
            }
        };

        Ok(())
    }

    pub fn notify_new_commit(
        &self,
        new_commit_index: u64,
    ) {
        for tx in &self.new_commit_listener {
            if let Err(e) = tx.send(new_commit_index) {
                error!("notify_new_commit failed: {:?}", e);
            }
        }
    }

    fn publish_status(&self) {
        let status = RaftStatus {
            node_id: self.node_id,
            role: self.role.as_i32(),
            current_term: self.role.current_term(),
            leader_id: self.ctx.cluster().current_leader_id(),
            commit_index: self.role.commit_index(),
            last_log_index: self.ctx.raft_log().last_entry_id(),
            last_applied: self.ctx.last_applied(),
        };
        self.status_tx.send_if_modified(|current| {
            if *current != status {
                *current = status;
                true
            } else {
                false
            }
        });
    }

    fn flush_storage(&self) {
        if let Err(e) = self.ctx.raft_log().flush() {
            error!("[Raft:{}] flush raft log failed: {:?}", self.node_id, e);
        }
        if let Err(e) = self.ctx.state_storage().flush() {
            error!("[Raft:{}] flush state storage failed: {:?}", self.node_id, e);
        }
    }
}

impl std::fmt::Debug for Raft {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Raft").field("node_id", &self.node_id).finish()
    }
}
