use std::collections::BTreeMap;

use dashmap::DashMap;
use tracing::debug;
use tracing::trace;

use crate::proto::client::CommitResult;
use crate::RaftLog;
use crate::Result;
use crate::StateMachine;

/// How many applied sequences are remembered per client
pub const DEFAULT_SESSION_WINDOW: usize = 1024;

/// What the session table knows about a `(client_id, sequence)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCheck {
    /// Not applied yet
    New,
    /// Applied; the cached result is returned to retransmissions
    Applied(CommitResult),
    /// Older than every sequence still remembered for this client
    Stale { last_applied_sequence: u64 },
}

/// Per-client record of applied sequences and their results.
///
/// Filled by the apply loop, read by the leader before it appends a
/// proposal. Rebuilt by replay after a restart.
#[derive(Debug)]
pub struct ClientSessions {
    sessions: DashMap<String, BTreeMap<u64, CommitResult>>,
    window: usize,
}

impl Default for ClientSessions {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_WINDOW)
    }
}

impl ClientSessions {
    pub fn new(window: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            window: window.max(1),
        }
    }

    /// Session table matching a state machine that already applied
    /// `1..=last_applied`. Replays the commands of that prefix the way the
    /// apply loop saw them: the first copy of a `(client, sequence)` wins.
    pub fn rebuild(
        window: usize,
        raft_log: &dyn RaftLog,
        state_machine: &dyn StateMachine,
        last_applied: u64,
    ) -> Result<Self> {
        let sessions = Self::new(window);
        if last_applied == 0 {
            return Ok(sessions);
        }

        for entry in raft_log.get_entries_range(1..=last_applied)? {
            let Some(command) = entry.client_command() else {
                continue;
            };
            if sessions.check(&command.client_id, command.sequence) != SessionCheck::New {
                continue;
            }
            let result = CommitResult {
                term: entry.term,
                index: entry.index,
                result: state_machine.applied_output(entry.index).unwrap_or_default(),
            };
            sessions.record(&command.client_id, command.sequence, result);
        }
        debug!(
            "rebuilt {} client sessions from applied prefix 1..={}",
            sessions.len(),
            last_applied
        );
        Ok(sessions)
    }

    pub fn check(
        &self,
        client_id: &str,
        sequence: u64,
    ) -> SessionCheck {
        let Some(session) = self.sessions.get(client_id) else {
            return SessionCheck::New;
        };

        if let Some(result) = session.get(&sequence) {
            return SessionCheck::Applied(result.clone());
        }

        if session.len() >= self.window {
            if let (Some((oldest, _)), Some((latest, _))) = (session.first_key_value(), session.last_key_value()) {
                if sequence < *oldest {
                    return SessionCheck::Stale {
                        last_applied_sequence: *latest,
                    };
                }
            }
        }

        SessionCheck::New
    }

    pub fn record(
        &self,
        client_id: &str,
        sequence: u64,
        result: CommitResult,
    ) {
        trace!("session {} applied sequence {} at {}", client_id, sequence, result.index);
        let mut session = self.sessions.entry(client_id.to_string()).or_default();
        session.insert(sequence, result);
        while session.len() > self.window {
            session.pop_first();
        }
    }

    pub fn last_applied_sequence(
        &self,
        client_id: &str,
    ) -> Option<u64> {
        self.sessions
            .get(client_id)
            .and_then(|s| s.last_key_value().map(|(seq, _)| *seq))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
