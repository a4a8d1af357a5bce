use std::time::Duration;

use crate::BackoffPolicy;

/// Client gateway timing and retry parameters
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound of a single attempt against one node
    /// Default: 1 second
    pub request_timeout: Duration,

    /// Bound of the whole submit call, retries included
    /// Default: 30 seconds
    pub overall_timeout: Duration,

    /// Attempt budget (`max_retries`, 0 for unlimited) and backoff between
    /// attempts
    pub retry: BackoffPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(1000),
            overall_timeout: Duration::from_secs(30),
            retry: BackoffPolicy {
                max_retries: 50,
                timeout_ms: 1000,
                base_delay_ms: 20,
                max_delay_ms: 500,
            },
        }
    }
}

impl ClientConfig {
    /// Client settings derived from the node's `retry.client` policy
    pub fn from_policy(policy: &BackoffPolicy) -> Self {
        Self {
            request_timeout: policy.timeout(),
            retry: *policy,
            ..Default::default()
        }
    }
}
