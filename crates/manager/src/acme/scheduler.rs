//! Background certificate renewal scheduler
//!
//! Periodically checks every managed domain and issues or renews as
//! needed. The renewal decision itself stays in [`check_renewal`].

use std::sync::Arc;
use std::time::Duration;

use certkeeper_common::DomainName;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::ErrorKind;
use super::manager::{check_renewal, CertificateManager};

/// Default check interval (12 hours)
const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(12 * 3600);

/// Minimum check interval (1 hour)
const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// Delay before the first check after start
const INITIAL_DELAY: Duration = Duration::from_secs(10);

/// Tokens older than this belong to no live attempt
const STALE_TOKEN_AGE: Duration = Duration::from_secs(24 * 3600);

/// Outcome of one pass over the managed domains
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenewalSummary {
    /// Domains inspected
    pub checked: usize,
    /// Domains issued or renewed
    pub renewed: Vec<DomainName>,
    /// Domains whose check or issuance failed
    pub failed: Vec<DomainName>,
}

/// Background certificate renewal scheduler
///
/// Failures are logged and left for the next tick; the scheduler has no
/// retry policy of its own.
pub struct RenewalScheduler {
    manager: Arc<CertificateManager>,
    domains: Vec<DomainName>,
    threshold: Duration,
    check_interval: Duration,
    initial_delay: Duration,
}

impl RenewalScheduler {
    /// Create a scheduler for `domains`, renewing when less than
    /// `threshold` validity remains
    pub fn new(
        manager: Arc<CertificateManager>,
        domains: Vec<DomainName>,
        threshold: Duration,
    ) -> Self {
        Self {
            manager,
            domains,
            threshold,
            check_interval: DEFAULT_CHECK_INTERVAL,
            initial_delay: INITIAL_DELAY,
        }
    }

    /// Set the check interval
    ///
    /// The interval is clamped to a minimum of 1 hour to avoid
    /// excessive polling.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval.max(MIN_CHECK_INTERVAL);
        self
    }

    /// Set the delay before the first check
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Run until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            check_interval_hours = self.check_interval.as_secs() / 3600,
            domain_count = self.domains.len(),
            "Starting certificate renewal scheduler"
        );

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Certificate renewal scheduler stopped");
                return;
            }
            _ = tokio::time::sleep(self.initial_delay) => {}
        }

        let mut interval = interval(self.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            debug!("Running scheduled certificate renewal check");
            self.check_renewals(&shutdown).await;
        }

        info!("Certificate renewal scheduler stopped");
    }

    /// Check all configured domains and issue or renew as needed
    pub async fn check_renewals(&self, cancel: &CancellationToken) -> RenewalSummary {
        let mut summary = RenewalSummary::default();

        match self
            .manager
            .tokens()
            .purge_tokens_older_than(STALE_TOKEN_AGE)
            .await
        {
            Ok(0) => {}
            Ok(purged) => info!(purged = purged, "Purged orphaned challenge tokens"),
            Err(e) => warn!(error = %e, "Failed to purge orphaned challenge tokens"),
        }

        info!(
            domain_count = self.domains.len(),
            "Checking certificates for renewal"
        );

        for domain in &self.domains {
            if cancel.is_cancelled() {
                break;
            }
            summary.checked += 1;

            let check = match check_renewal(
                self.manager.tokens().as_ref(),
                self.manager.storage(),
                domain,
                self.threshold,
            )
            .await
            {
                Ok(check) => check,
                Err(e) => {
                    warn!(
                        domain = %domain,
                        error = %e,
                        "Failed to check certificate renewal status"
                    );
                    summary.failed.push(domain.clone());
                    continue;
                }
            };

            if !check.due {
                debug!(domain = %domain, "Certificate is still valid");
                continue;
            }

            let result = if check.record.is_some() {
                self.manager.renew(domain, cancel).await
            } else {
                self.manager.issue(domain, cancel).await
            };

            match result {
                Ok(_) => summary.renewed.push(domain.clone()),
                Err(e) if e.kind() == ErrorKind::Cancelled => break,
                Err(e) => {
                    error!(
                        domain = %domain,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Certificate renewal failed"
                    );
                    // Continue with other domains
                    summary.failed.push(domain.clone());
                }
            }
        }

        summary
    }
}

impl std::fmt::Debug for RenewalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalScheduler")
            .field("domains", &self.domains)
            .field("threshold", &self.threshold)
            .field("check_interval", &self.check_interval)
            .finish()
    }
}
