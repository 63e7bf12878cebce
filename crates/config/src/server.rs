//! Daemon plumbing: solver listener, token store backend, polling and
//! renewal cadence.

use std::path::PathBuf;
use std::time::Duration;

/// HTTP-01 solver listener
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Bind address, must be reachable on port 80 from the authority
    pub address: String,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            address: default_solver_address(),
        }
    }
}

/// Token and domain record persistence
#[derive(Debug, Clone, Default, PartialEq)]
pub enum StoreConfig {
    /// Process-local store, lost on restart
    #[default]
    Memory,
    /// Durable store rooted at a directory
    Filesystem { path: PathBuf },
}

/// Polling policy while waiting on the authority
#[derive(Debug, Clone, PartialEq)]
pub struct IssuanceConfig {
    pub poll_initial_delay_ms: u64,
    pub poll_max_delay_ms: u64,
    /// Upper bound on each wait (validation, finalization)
    pub validation_timeout_secs: u64,
}

impl IssuanceConfig {
    pub fn poll_initial_delay(&self) -> Duration {
        Duration::from_millis(self.poll_initial_delay_ms)
    }

    pub fn poll_max_delay(&self) -> Duration {
        Duration::from_millis(self.poll_max_delay_ms)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            poll_initial_delay_ms: default_poll_initial_delay_ms(),
            poll_max_delay_ms: default_poll_max_delay_ms(),
            validation_timeout_secs: default_validation_timeout_secs(),
        }
    }
}

/// Domains kept issued by the renewal scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct RenewalConfig {
    pub domains: Vec<String>,
    pub renew_before_days: u32,
    pub check_interval_hours: u64,
}

impl RenewalConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_hours.saturating_mul(3600))
    }

    pub fn threshold(&self) -> Duration {
        Duration::from_secs(u64::from(self.renew_before_days) * 86_400)
    }
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            renew_before_days: default_renew_before_days(),
            check_interval_hours: default_check_interval_hours(),
        }
    }
}

pub fn default_solver_address() -> String {
    "0.0.0.0:80".to_string()
}

pub fn default_poll_initial_delay_ms() -> u64 {
    500
}

pub fn default_poll_max_delay_ms() -> u64 {
    8_000
}

pub fn default_validation_timeout_secs() -> u64 {
    120
}

pub fn default_renew_before_days() -> u32 {
    30
}

pub fn default_check_interval_hours() -> u64 {
    12
}
