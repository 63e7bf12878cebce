//! Solver, store, issuance and renewal KDL parsing.

use anyhow::Result;
use std::path::PathBuf;
use tracing::trace;

use crate::server::*;

use super::helpers::{get_string_entry, get_string_list, get_u64_entry};

/// Parse solver listener block
pub fn parse_solver_config(node: &kdl::KdlNode) -> Result<SolverConfig> {
    trace!("Parsing solver configuration block");

    let config = SolverConfig {
        address: get_string_entry(node, "address").unwrap_or_else(default_solver_address),
    };

    trace!(address = %config.address, "Parsed solver configuration");
    Ok(config)
}

/// Parse store block
///
/// A `path` selects the filesystem store; an empty block keeps the
/// in-memory default.
pub fn parse_store_config(node: &kdl::KdlNode) -> Result<StoreConfig> {
    trace!("Parsing store configuration block");

    let config = match get_string_entry(node, "path") {
        Some(path) => StoreConfig::Filesystem {
            path: PathBuf::from(path),
        },
        None => StoreConfig::Memory,
    };

    trace!(store = ?config, "Parsed store configuration");
    Ok(config)
}

/// Parse issuance polling block
pub fn parse_issuance_config(node: &kdl::KdlNode) -> Result<IssuanceConfig> {
    trace!("Parsing issuance configuration block");

    let config = IssuanceConfig {
        poll_initial_delay_ms: get_u64_entry(node, "poll-initial-delay-ms")?
            .unwrap_or_else(default_poll_initial_delay_ms),
        poll_max_delay_ms: get_u64_entry(node, "poll-max-delay-ms")?
            .unwrap_or_else(default_poll_max_delay_ms),
        validation_timeout_secs: get_u64_entry(node, "validation-timeout-secs")?
            .unwrap_or_else(default_validation_timeout_secs),
    };

    trace!(
        poll_initial_delay_ms = config.poll_initial_delay_ms,
        poll_max_delay_ms = config.poll_max_delay_ms,
        validation_timeout_secs = config.validation_timeout_secs,
        "Parsed issuance configuration"
    );

    Ok(config)
}

/// Parse renewal block
pub fn parse_renewal_config(node: &kdl::KdlNode) -> Result<RenewalConfig> {
    trace!("Parsing renewal configuration block");

    let renew_before_days = match get_u64_entry(node, "renew-before-days")? {
        Some(days) => u32::try_from(days)
            .map_err(|_| anyhow::anyhow!("'renew-before-days' is out of range: {}", days))?,
        None => default_renew_before_days(),
    };

    let config = RenewalConfig {
        domains: get_string_list(node, "domains"),
        renew_before_days,
        check_interval_hours: get_u64_entry(node, "check-interval-hours")?
            .unwrap_or_else(default_check_interval_hours),
    };

    trace!(
        domain_count = config.domains.len(),
        renew_before_days = config.renew_before_days,
        check_interval_hours = config.check_interval_hours,
        "Parsed renewal configuration"
    );

    Ok(config)
}
