use std::fmt::Debug;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Configuration parameters for the Raft consensus algorithm
#[derive(Serialize, Deserialize, Clone)]
pub struct RaftConfig {
    /// Log replication: heartbeat cadence and batch size
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Leader election timing
    #[serde(default)]
    pub election: ElectionConfig,

    /// Apply loop settings
    #[serde(default)]
    pub commit_handler: CommitHandlerConfig,

    /// Cooperative leadership transfer
    #[serde(default)]
    pub leadership_transfer: LeadershipTransferConfig,
}

impl Debug for RaftConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RaftConfig")
            .field("election", &self.election)
            .field("replication", &self.replication)
            .finish()
    }
}
impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            replication: ReplicationConfig::default(),
            election: ElectionConfig::default(),
            commit_handler: CommitHandlerConfig::default(),
            leadership_transfer: LeadershipTransferConfig::default(),
        }
    }
}
impl RaftConfig {
    /// Validates all Raft subsystem configurations
    pub fn validate(&self) -> Result<()> {
        self.replication.validate()?;
        self.election.validate()?;
        self.commit_handler.validate()?;
        self.leadership_transfer.validate()?;

        if self.replication.rpc_append_entries_clock_in_ms >= self.election.election_timeout_min {
            return Err(Error::Config(ConfigError::Message(format!(
                "heartbeat interval {}ms must be less than election_timeout_min {}ms",
                self.replication.rpc_append_entries_clock_in_ms, self.election.election_timeout_min
            ))));
        }

        Ok(())
    }

    /// Leader heartbeat cadence
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.replication.rpc_append_entries_clock_in_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReplicationConfig {
    /// Heartbeat interval of the leader
    #[serde(default = "default_append_interval")]
    pub rpc_append_entries_clock_in_ms: u64,

    #[serde(default = "default_entries_per_replication")]
    pub append_entries_max_entries_per_replication: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            rpc_append_entries_clock_in_ms: default_append_interval(),
            append_entries_max_entries_per_replication: default_entries_per_replication(),
        }
    }
}
impl ReplicationConfig {
    fn validate(&self) -> Result<()> {
        if self.rpc_append_entries_clock_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "rpc_append_entries_clock_in_ms cannot be 0".into(),
            )));
        }

        if self.append_entries_max_entries_per_replication == 0 {
            return Err(Error::Config(ConfigError::Message(
                "append_entries_max_entries_per_replication must be > 0".into(),
            )));
        }

        Ok(())
    }
}
fn default_append_interval() -> u64 {
    100
}
fn default_entries_per_replication() -> u64 {
    100
}

/// Election timeout is drawn from `[election_timeout_min, election_timeout_max]`
/// every time the timer is armed.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ElectionConfig {
    #[serde(default = "default_election_timeout_min")]
    pub election_timeout_min: u64,

    #[serde(default = "default_election_timeout_max")]
    pub election_timeout_max: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: default_election_timeout_min(),
            election_timeout_max: default_election_timeout_max(),
        }
    }
}
impl ElectionConfig {
    fn validate(&self) -> Result<()> {
        if self.election_timeout_min == 0 {
            return Err(Error::Config(ConfigError::Message(
                "election_timeout_min cannot be 0".into(),
            )));
        }

        if self.election_timeout_min >= self.election_timeout_max {
            return Err(Error::Config(ConfigError::Message(format!(
                "election_timeout_min {}ms must be less than election_timeout_max {}ms",
                self.election_timeout_min, self.election_timeout_max
            ))));
        }

        Ok(())
    }

    pub fn timeout_range(&self) -> (u64, u64) {
        (self.election_timeout_min, self.election_timeout_max)
    }
}
fn default_election_timeout_min() -> u64 {
    300
}
fn default_election_timeout_max() -> u64 {
    600
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommitHandlerConfig {
    /// Upper bound on entries applied per loop iteration
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Fallback interval for the apply loop when no commit signal arrives
    #[serde(default = "default_process_interval_ms")]
    pub process_interval_ms: u64,
}
impl Default for CommitHandlerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            process_interval_ms: default_process_interval_ms(),
        }
    }
}
impl CommitHandlerConfig {
    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config(ConfigError::Message("batch_size must be > 0".into())));
        }

        if self.process_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "process_interval_ms must be > 0".into(),
            )));
        }

        Ok(())
    }
}
fn default_batch_size() -> u64 {
    100
}
fn default_process_interval_ms() -> u64 {
    10
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LeadershipTransferConfig {
    /// A transfer not finished within this window is aborted and the leader
    /// accepts proposals again.
    #[serde(default = "default_transfer_timeout_ms")]
    pub timeout_ms: u64,
}
impl Default for LeadershipTransferConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_transfer_timeout_ms(),
        }
    }
}
impl LeadershipTransferConfig {
    fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "leadership_transfer.timeout_ms must be > 0".into(),
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
fn default_transfer_timeout_ms() -> u64 {
    2000
}
