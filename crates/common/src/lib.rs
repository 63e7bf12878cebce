//! Certkeeper Common
//!
//! Records and identifiers shared by the certkeeper crates. Nothing in
//! here performs I/O.

pub mod ids;
pub mod types;

pub use ids::{is_valid_token, AttemptId, DomainName, DomainNameError};
pub use types::{DomainSslDetails, IssuedCertificate, KeyAuthorizationToken};
