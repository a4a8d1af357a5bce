use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct BackoffPolicy {
    /// Maximum number of retries (0 means unlimited retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single operation timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_ms: default_op_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "{}.timeout_ms must be > 0",
                name
            ))));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "{}.base_delay_ms {} exceeds max_delay_ms {}",
                name, self.base_delay_ms, self.max_delay_ms
            ))));
        }
        Ok(())
    }
}

/// Divide strategies by business domain
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    /// AppendEntries and TimeoutNow RPCs. `timeout_ms` bounds each request.
    #[serde(default = "default_append_entries_policy")]
    pub append_entries: BackoffPolicy,

    /// RequestVote RPCs. `timeout_ms` bounds each request.
    #[serde(default = "default_election_policy")]
    pub election: BackoffPolicy,

    /// Client gateway redirects and retries
    #[serde(default = "default_client_policy")]
    pub client: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            append_entries: default_append_entries_policy(),
            election: default_election_policy(),
            client: default_client_policy(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.append_entries.validate("append_entries")?;
        self.election.validate("election")?;
        self.client.validate("client")?;
        Ok(())
    }
}

fn default_append_entries_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 1,
        timeout_ms: 100,
        base_delay_ms: 10,
        max_delay_ms: 100,
    }
}
fn default_election_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 1,
        timeout_ms: 100,
        base_delay_ms: 10,
        max_delay_ms: 100,
    }
}
fn default_client_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 50,
        timeout_ms: 1000,
        base_delay_ms: 20,
        max_delay_ms: 500,
    }
}
fn default_max_retries() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    100
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
