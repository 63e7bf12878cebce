//! KDL configuration parsing.

mod acme;
mod helpers;
mod server;

use anyhow::Result;
use tracing::debug;

use crate::Config;

pub use acme::parse_acme_config;
pub use server::{
    parse_issuance_config, parse_renewal_config, parse_solver_config, parse_store_config,
};

/// Parse a complete configuration document
///
/// `source_name` is only used to label syntax diagnostics.
pub fn parse_document(content: &str, source_name: &str) -> Result<Config> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        let report = miette::Report::new(e).with_source_code(miette::NamedSource::new(
            source_name,
            content.to_string(),
        ));
        anyhow::anyhow!("{:?}", report)
    })?;

    let mut acme = None;
    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "acme" => acme = Some(parse_acme_config(node)?),
            "solver" => config.solver = parse_solver_config(node)?,
            "store" => config.store = parse_store_config(node)?,
            "issuance" => config.issuance = parse_issuance_config(node)?,
            "renewal" => config.renewal = parse_renewal_config(node)?,
            other => {
                return Err(anyhow::anyhow!(
                    "Unknown configuration block '{}'. Valid blocks: acme, solver, store, issuance, renewal",
                    other
                ));
            }
        }
    }

    config.acme = acme.ok_or_else(|| {
        anyhow::anyhow!("Configuration requires an 'acme' block with email and key paths")
    })?;

    debug!(
        source = %source_name,
        renewal_domains = config.renewal.domains.len(),
        "Parsed configuration document"
    );

    Ok(config)
}
