//! Configuration validation
//!
//! Structural checks run on every load. With the `validation` feature,
//! checks that touch the filesystem and the network are available too.

use std::fmt;
use std::net::SocketAddr;

use certkeeper_common::DomainName;

use crate::Config;

#[cfg(feature = "validation")]
mod certs;
mod lint;
#[cfg(feature = "validation")]
mod network;

#[cfg(feature = "validation")]
pub use certs::validate_certificates;
pub use lint::lint_config;
#[cfg(feature = "validation")]
pub use network::validate_solver_address;

/// Area a validation error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Account,
    Path,
    Domain,
    Issuance,
    Network,
    Certificate,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Account => "account",
            Self::Path => "path",
            Self::Domain => "domain",
            Self::Issuance => "issuance",
            Self::Network => "network",
            Self::Certificate => "certificate",
        };
        write!(f, "{}", name)
    }
}

/// A problem that prevents the configuration from being used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ValidationError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// A problem worth reporting that does not block startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Accumulated validation outcome
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert to a `Result`, joining all errors into one message
    pub fn into_result(self) -> anyhow::Result<Vec<ValidationWarning>> {
        if self.errors.is_empty() {
            return Ok(self.warnings);
        }
        let messages: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        Err(anyhow::anyhow!(
            "{} configuration error(s):\n  {}",
            messages.len(),
            messages.join("\n  ")
        ))
    }
}

/// Structural validation that needs neither the filesystem nor the network
pub fn validate_structure(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    // Account contact
    let email = config.acme.email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => result.add_error(ValidationError::new(
            ErrorCategory::Account,
            format!("Invalid contact email '{}'", config.acme.email),
        )),
    }

    // Key material locations
    for (name, path) in [
        ("account-key", &config.acme.account_key),
        ("domain-keys", &config.acme.domain_keys),
        ("full-chains", &config.acme.full_chains),
    ] {
        if path.as_os_str().is_empty() {
            result.add_error(ValidationError::new(
                ErrorCategory::Path,
                format!("'{}' must not be empty", name),
            ));
        } else if path.is_relative() {
            result.add_warning(ValidationWarning::new(format!(
                "'{}' is a relative path ({}); it resolves against the working directory",
                name,
                path.display()
            )));
        }
    }

    // Solver listener
    if config.solver.address.parse::<SocketAddr>().is_err() {
        result.add_error(ValidationError::new(
            ErrorCategory::Network,
            format!(
                "Solver address '{}' is not a socket address, e.g., \"0.0.0.0:80\"",
                config.solver.address
            ),
        ));
    }

    // Polling policy
    let issuance = &config.issuance;
    if issuance.poll_initial_delay_ms == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Issuance,
            "'poll-initial-delay-ms' must be greater than zero",
        ));
    }
    if issuance.poll_initial_delay_ms > issuance.poll_max_delay_ms {
        result.add_error(ValidationError::new(
            ErrorCategory::Issuance,
            format!(
                "'poll-initial-delay-ms' ({}) exceeds 'poll-max-delay-ms' ({})",
                issuance.poll_initial_delay_ms, issuance.poll_max_delay_ms
            ),
        ));
    }
    if issuance.validation_timeout_secs == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Issuance,
            "'validation-timeout-secs' must be greater than zero",
        ));
    }

    // Managed domains
    let mut seen = std::collections::HashSet::new();
    for raw in &config.renewal.domains {
        match DomainName::parse(raw) {
            Ok(name) => {
                if !seen.insert(name.clone()) {
                    result.add_error(ValidationError::new(
                        ErrorCategory::Domain,
                        format!("Domain '{}' is listed more than once", name),
                    ));
                }
            }
            Err(e) => result.add_error(ValidationError::new(
                ErrorCategory::Domain,
                format!("Invalid renewal domain '{}': {}", raw, e),
            )),
        }
    }

    result
}
