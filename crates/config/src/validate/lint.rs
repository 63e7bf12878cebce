//! Configuration linting for common mistakes
//!
//! Checks configuration for settings that work but are likely mistakes.

use super::{ValidationResult, ValidationWarning};
use crate::{Config, StoreConfig};

/// Validity period of certificates issued by Let's Encrypt
const TYPICAL_CERT_LIFETIME_DAYS: u32 = 90;

/// Lint configuration for common mistakes
pub fn lint_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.acme.staging && config.acme.directory.is_none() {
        result.add_warning(ValidationWarning::new(
            "Using the Let's Encrypt staging directory; issued certificates are not publicly trusted",
        ));
    }

    // Renewal window
    let renewal = &config.renewal;
    if renewal.renew_before_days < 7 {
        result.add_warning(ValidationWarning::new(format!(
            "'renew-before-days' is {} days; a failed renewal leaves little time to recover",
            renewal.renew_before_days
        )));
    }
    if renewal.renew_before_days >= TYPICAL_CERT_LIFETIME_DAYS {
        result.add_warning(ValidationWarning::new(format!(
            "'renew-before-days' ({}) is not shorter than a {}-day certificate lifetime; every check will renew",
            renewal.renew_before_days, TYPICAL_CERT_LIFETIME_DAYS
        )));
    }
    if renewal.check_interval_hours > u64::from(renewal.renew_before_days) * 24 {
        result.add_warning(ValidationWarning::new(format!(
            "'check-interval-hours' ({}) is longer than the renewal window; certificates may expire between checks",
            renewal.check_interval_hours
        )));
    }

    if matches!(config.store, StoreConfig::Memory) {
        result.add_warning(ValidationWarning::new(
            "No 'store' path configured; domain records are lost on restart",
        ));
    }

    // HTTP-01 is always probed on port 80
    if !config.solver.address.ends_with(":80") {
        result.add_warning(ValidationWarning::new(format!(
            "Solver listens on '{}'; the authority validates on port 80, so traffic must be forwarded",
            config.solver.address
        )));
    }

    result
}
