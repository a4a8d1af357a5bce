use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::timeout;

use crate::BackoffPolicy;
use crate::NetworkError;
use crate::Result;

/// Runs one peer request bounded by `duration`.
pub(crate) async fn task_with_timeout<F, P>(
    node_id: u32,
    duration: Duration,
    task: F,
) -> Result<P>
where
    F: Future<Output = Result<P>>,
{
    match timeout(duration, task).await {
        Ok(r) => r,
        Err(_) => Err(NetworkError::Timeout { node_id, duration }.into()),
    }
}

/// Exponential backoff for the `attempt`-th retry (0-based), capped at
/// `max_delay_ms`, with up to 50% random jitter added on top so retrying
/// callers spread out.
pub fn backoff_with_jitter(
    policy: &BackoffPolicy,
    attempt: usize,
) -> Duration {
    let exp = attempt.min(16) as u32;
    let base = policy.base_delay_ms.saturating_mul(1u64 << exp).min(policy.max_delay_ms);
    let jitter = if base > 1 {
        rand::thread_rng().gen_range(0..=base / 2)
    } else {
        0
    };
    Duration::from_millis(base + jitter)
}
