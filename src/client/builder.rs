use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use config::ConfigError;
use nanoid::nanoid;

use super::ClientConfig;
use super::RaftClient;
use crate::BackoffPolicy;
use crate::ClientTransport;
use crate::Error;
use crate::Result;

pub struct RaftClientBuilder {
    config: ClientConfig,
    members: Vec<u32>,
    client_id: Option<String>,
    transport: Arc<dyn ClientTransport>,
}

impl RaftClientBuilder {
    /// New builder over the cluster `members`, default config
    pub fn new(
        members: Vec<u32>,
        transport: Arc<dyn ClientTransport>,
    ) -> Self {
        Self {
            config: ClientConfig::default(),
            members,
            client_id: None,
            transport,
        }
    }

    /// Fixed client id instead of a generated one. Two clients must never
    /// share an id: their sequences would collide.
    pub fn client_id(
        mut self,
        client_id: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set per-attempt timeout (default: 1s)
    pub fn request_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the bound of a whole submit call (default: 30s)
    pub fn overall_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.overall_timeout = timeout;
        self
    }

    pub fn retry_policy(
        mut self,
        retry: BackoffPolicy,
    ) -> Self {
        self.config.retry = retry;
        self
    }

    /// Completely replaces the default configuration
    pub fn set_config(
        mut self,
        config: ClientConfig,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<RaftClient> {
        if self.members.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "client needs at least one cluster member".into(),
            )));
        }
        if self.config.request_timeout.is_zero() || self.config.overall_timeout.is_zero() {
            return Err(Error::Config(ConfigError::Message(
                "client timeouts must be > 0".into(),
            )));
        }

        Ok(RaftClient {
            client_id: self.client_id.unwrap_or_else(|| nanoid!()),
            last_sequence: AtomicU64::new(0),
            members: self.members,
            leader_hint: ArcSwapOption::empty(),
            round_robin: AtomicUsize::new(0),
            transport: self.transport,
            config: self.config,
        })
    }
}
