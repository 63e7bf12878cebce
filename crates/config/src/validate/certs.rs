//! Certificate validation
//!
//! Inspects the stored full chains of the managed domains: existence,
//! parseability and expiry.

use super::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};
use crate::Config;
use certkeeper_common::DomainName;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Validate stored certificates for every renewal domain
pub async fn validate_certificates(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();
    let threshold = config.renewal.threshold();

    for raw in &config.renewal.domains {
        // Invalid names are reported by the structural checks
        let Ok(domain) = DomainName::parse(raw) else {
            continue;
        };

        let chain_path = config.acme.full_chains.join(format!("{}.crt", domain));
        if !chain_path.exists() {
            result.add_warning(ValidationWarning::new(format!(
                "No certificate for '{}' at {:?}; it will be issued on first check",
                domain, chain_path
            )));
            continue;
        }

        match load_and_validate_cert(&chain_path, threshold) {
            Ok(Some(warning)) => result.add_warning(warning),
            Ok(None) => {}
            Err(e) => result.add_error(e),
        }
    }

    result
}

/// Load a certificate chain and check the leaf's expiry
fn load_and_validate_cert(
    cert_path: &Path,
    threshold: Duration,
) -> Result<Option<ValidationWarning>, ValidationError> {
    use std::fs;

    let cert_pem = fs::read(cert_path).map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Failed to read certificate {:?}: {}", cert_path, e),
        )
    })?;

    // The leaf is the first block of the chain
    let pem = pem::parse(&cert_pem).map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Failed to parse certificate {:?}: {}", cert_path, e),
        )
    })?;

    let (_, cert) = x509_parser::parse_x509_certificate(pem.contents()).map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Invalid X509 certificate {:?}: {}", cert_path, e),
        )
    })?;

    let now = SystemTime::now();
    let not_after = cert.validity().not_after.timestamp().max(0) as u64;
    let expiry_time = SystemTime::UNIX_EPOCH + Duration::from_secs(not_after);

    if expiry_time < now {
        return Ok(Some(ValidationWarning::new(format!(
            "Certificate expired: {:?} (expired at {}); it will be renewed",
            cert_path,
            cert.validity().not_after
        ))));
    }

    if expiry_time < now + threshold {
        return Ok(Some(ValidationWarning::new(format!(
            "Certificate is due for renewal: {:?} (expires at {})",
            cert_path,
            cert.validity().not_after
        ))));
    }

    Ok(None)
}
