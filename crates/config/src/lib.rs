//! Configuration loading and validation for certkeeper.
//!
//! Configuration is a KDL document:
//!
//! ```kdl
//! acme {
//!     email "admin@example.com"
//!     account-key "/var/lib/certkeeper/account.json"
//!     domain-keys "/var/lib/certkeeper/keys"
//!     full-chains "/var/lib/certkeeper/certs"
//! }
//! solver {
//!     address "0.0.0.0:80"
//! }
//! store {
//!     path "/var/lib/certkeeper/store"
//! }
//! renewal {
//!     domains "example.com" "www.example.com"
//!     renew-before-days 30
//! }
//! ```
//!
//! Only the `acme` block is required.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info, warn};

pub mod acme;
pub mod kdl;
pub mod server;
pub mod validate;

pub use acme::{AcmeConfig, LETS_ENCRYPT_PRODUCTION, LETS_ENCRYPT_STAGING};
pub use server::{IssuanceConfig, RenewalConfig, SolverConfig, StoreConfig};
pub use validate::{
    ErrorCategory, ValidationError, ValidationResult, ValidationWarning,
};

/// Complete certkeeper configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub acme: AcmeConfig,
    pub solver: SolverConfig,
    pub store: StoreConfig,
    pub issuance: IssuanceConfig,
    pub renewal: RenewalConfig,
}

impl Config {
    /// Load configuration from a KDL file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        let config = Self::from_kdl(&content, &path.display().to_string())?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from KDL source
    pub fn from_kdl(content: &str, source_name: &str) -> Result<Self> {
        kdl::parse_document(content, source_name)
    }

    /// Structural validation plus best-practice lints
    ///
    /// Errors abort; lint warnings are logged and returned.
    pub fn validate(&self) -> Result<Vec<ValidationWarning>> {
        let mut result = validate::validate_structure(self);
        result.merge(validate::lint_config(self));

        for warning in &result.warnings {
            warn!(warning = %warning, "Configuration warning");
        }
        debug!(
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "Validated configuration"
        );

        result.into_result()
    }

    /// Full validation including stored certificates and the solver listener
    #[cfg(feature = "validation")]
    pub async fn validate_environment(&self) -> ValidationResult {
        let mut result = validate::validate_structure(self);
        result.merge(validate::lint_config(self));
        result.merge(validate::validate_certificates(self).await);
        result.merge(validate::validate_solver_address(self).await);
        result
    }
}
