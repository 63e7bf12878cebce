//! `acme { ... }` block parsing.

use anyhow::Result;
use std::path::PathBuf;
use tracing::trace;

use crate::acme::AcmeConfig;

use super::helpers::{get_bool_entry, get_string_entry, require_string_entry};

/// Parse the account configuration block
pub fn parse_acme_config(node: &kdl::KdlNode) -> Result<AcmeConfig> {
    trace!("Parsing acme configuration block");

    let config = AcmeConfig {
        email: require_string_entry(node, "email", "\"admin@example.com\"")?,
        account_key: require_string_entry(
            node,
            "account-key",
            "\"/var/lib/certkeeper/account.json\"",
        )?
        .into(),
        domain_keys: PathBuf::from(require_string_entry(
            node,
            "domain-keys",
            "\"/var/lib/certkeeper/keys\"",
        )?),
        full_chains: PathBuf::from(require_string_entry(
            node,
            "full-chains",
            "\"/var/lib/certkeeper/certs\"",
        )?),
        directory: get_string_entry(node, "directory"),
        staging: get_bool_entry(node, "staging").unwrap_or(false),
    };

    trace!(
        email = %config.email,
        directory = %config.directory_url(),
        "Parsed acme configuration"
    );

    Ok(config)
}
