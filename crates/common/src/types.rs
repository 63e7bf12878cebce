//! Plain data records shared between the store, the solver and the manager.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::DomainName;

/// Pending HTTP-01 challenge: the token the authority will ask for and the
/// key authorization the solver must answer with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAuthorizationToken {
    /// Challenge token chosen by the authority
    pub token: String,
    /// Value served at `/.well-known/acme-challenge/<token>`
    pub authorization: String,
}

impl KeyAuthorizationToken {
    pub fn new(token: impl Into<String>, authorization: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            authorization: authorization.into(),
        }
    }
}

/// Provenance of the certificate currently issued for a domain.
///
/// There is at most one record per domain; a renewal overwrites
/// `creation_date` in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSslDetails {
    pub domain: DomainName,
    /// Time of the last successful issuance
    pub creation_date: DateTime<Utc>,
}

impl DomainSslDetails {
    pub fn new(domain: DomainName, creation_date: DateTime<Utc>) -> Self {
        Self {
            domain,
            creation_date,
        }
    }
}

/// Key material returned by a completed order, not yet written to disk
#[derive(Clone)]
pub struct IssuedCertificate {
    pub domain: DomainName,
    /// PKCS#8 PEM private key the CSR was signed with
    pub key_pem: String,
    /// Leaf certificate followed by intermediates, PEM
    pub chain_pem: String,
    /// `notAfter` of the leaf certificate
    pub expires: DateTime<Utc>,
}

impl fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("domain", &self.domain)
            .field("key_pem", &"<redacted>")
            .field("chain_len", &self.chain_pem.len())
            .field("expires", &self.expires)
            .finish()
    }
}
