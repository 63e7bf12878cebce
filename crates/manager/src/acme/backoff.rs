//! Polling cadence while waiting on the authority.

use std::time::Duration;

use certkeeper_config::IssuanceConfig;

/// How often and how long to poll an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// First delay between two polls
    pub initial_delay: Duration,
    /// Cap for the doubling delay
    pub max_delay: Duration,
    /// Upper bound on one wait (validation, finalization)
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            timeout: Duration::from_secs(120),
        }
    }
}

impl From<&IssuanceConfig> for PollPolicy {
    fn from(config: &IssuanceConfig) -> Self {
        Self {
            initial_delay: config.poll_initial_delay(),
            max_delay: config.poll_max_delay(),
            timeout: config.validation_timeout(),
        }
    }
}

/// Doubling delay, capped
#[derive(Debug)]
pub(crate) struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub(crate) fn new(policy: &PollPolicy) -> Self {
        Self {
            next: policy.initial_delay.min(policy.max_delay),
            max: policy.max_delay,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }
}
