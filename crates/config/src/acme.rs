//! Certificate authority account configuration.

use std::path::PathBuf;

/// Let's Encrypt production directory
pub const LETS_ENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Let's Encrypt staging directory
pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Account and key material locations.
///
/// `email`, `account_key`, `domain_keys` and `full_chains` are the options
/// the issuance core consumes; `directory` and `staging` only select which
/// authority the account is registered with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcmeConfig {
    /// Contact email registered with the authority
    pub email: String,
    /// Account credentials file (contains the account private key)
    pub account_key: PathBuf,
    /// Directory holding one `<domain>.key` per managed domain
    pub domain_keys: PathBuf,
    /// Directory holding one `<domain>.crt` full chain per managed domain
    pub full_chains: PathBuf,
    /// Explicit directory URL, overrides `staging`
    pub directory: Option<String>,
    /// Use the Let's Encrypt staging environment
    pub staging: bool,
}

impl AcmeConfig {
    /// Directory URL the account is registered against
    pub fn directory_url(&self) -> &str {
        match (&self.directory, self.staging) {
            (Some(url), _) => url,
            (None, true) => LETS_ENCRYPT_STAGING,
            (None, false) => LETS_ENCRYPT_PRODUCTION,
        }
    }
}
