//! Type-safe identifier newtypes for certkeeper.
//!
//! Domain names double as storage keys and file names, so they are
//! validated once at the edge and carried as [`DomainName`] afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Maximum length of a fully qualified domain name
pub const MAX_DOMAIN_LEN: usize = 253;

/// Maximum length of a single DNS label
pub const MAX_LABEL_LEN: usize = 63;

/// Maximum accepted length of an ACME challenge token
pub const MAX_TOKEN_LEN: usize = 256;

/// Reasons a string is not an acceptable managed domain name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainNameError {
    #[error("domain name is empty")]
    Empty,

    #[error("domain name is {0} bytes long (max: {MAX_DOMAIN_LEN})")]
    TooLong(usize),

    #[error("wildcard domains are not supported: {0}")]
    Wildcard(String),

    #[error("invalid label '{label}' in domain '{domain}'")]
    InvalidLabel { domain: String, label: String },
}

/// A validated, lower-cased DNS name managed by certkeeper.
///
/// Only LDH labels are accepted (letters, digits, hyphen), which also
/// makes the name safe to use as a file name under the key and chain
/// roots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainName(String);

impl DomainName {
    /// Parse and normalize a domain name
    pub fn parse(input: &str) -> Result<Self, DomainNameError> {
        let name = input.strip_suffix('.').unwrap_or(input).to_ascii_lowercase();

        if name.is_empty() {
            return Err(DomainNameError::Empty);
        }
        if name.len() > MAX_DOMAIN_LEN {
            return Err(DomainNameError::TooLong(name.len()));
        }
        if name.split('.').any(|label| label == "*") {
            return Err(DomainNameError::Wildcard(name));
        }

        for label in name.split('.') {
            let valid = !label.is_empty()
                && label.len() <= MAX_LABEL_LEN
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
            if !valid {
                return Err(DomainNameError::InvalidLabel {
                    domain: name.clone(),
                    label: label.to_string(),
                });
            }
        }

        Ok(Self(name))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DomainName {
    type Err = DomainNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DomainName {
    type Error = DomainNameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<DomainName> for String {
    fn from(name: DomainName) -> Self {
        name.0
    }
}

impl AsRef<str> for DomainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique ID for one issuance or renewal attempt.
///
/// Attached to every log line of an attempt so the interleaved output of
/// concurrent domains can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(String);

impl AttemptId {
    /// Create a new random attempt ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Check whether a challenge token is well-formed.
///
/// ACME tokens are base64url without padding. Anything else cannot have
/// been issued by an authority and is never looked up.
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
