use std::time::Duration;

use tokio::time::Instant;

/// Leader heartbeat cadence
#[derive(Clone, Debug)]
pub struct ReplicationTimer {
    heartbeat_interval: Duration,
    heartbeat_deadline: Instant,
}

impl ReplicationTimer {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            heartbeat_interval,
            // first tick right away so followers learn about the new leader
            heartbeat_deadline: Instant::now(),
        }
    }

    pub fn reset_replication(&mut self) {
        self.heartbeat_deadline = Instant::now() + self.heartbeat_interval;
    }

    pub fn remaining(&self) -> Duration {
        self.heartbeat_deadline.saturating_duration_since(Instant::now())
    }

    pub fn next_deadline(&self) -> Instant {
        self.heartbeat_deadline
    }

    pub fn tick_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.heartbeat_deadline <= Instant::now()
    }
}
