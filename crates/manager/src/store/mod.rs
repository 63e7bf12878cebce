//! Token and domain-record persistence.
//!
//! Challenge tokens are short-lived: written right before a challenge is
//! presented to the authority, read by the solver, deleted once the
//! challenge resolves. Domain records are durable: one per domain,
//! overwritten on every successful issuance.

mod fs;
mod memory;

pub use fs::FsTokenStore;
pub use memory::MemoryTokenStore;

use std::time::Duration;

use async_trait::async_trait;
use certkeeper_common::{DomainName, DomainSslDetails};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Token store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying storage could not be read or written.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be encoded or decoded.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Token name is not a valid ACME token.
    #[error("invalid challenge token: {0:?}")]
    InvalidToken(String),

    /// Internal store error.
    #[error("internal store error: {0}")]
    Internal(String),
}

/// Persistence contract shared by the ACME client and the challenge solver.
///
/// A completed `put_token` must be visible to every later
/// `get_authorization`; the client relies on this to only tell the
/// authority a challenge is ready after the write returned.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert or replace the authorization for a token.
    async fn put_token(&self, token: &str, authorization: &str) -> Result<(), StoreError>;

    /// Authorization for a token, `None` if unknown or already deleted.
    async fn get_authorization(&self, token: &str) -> Result<Option<String>, StoreError>;

    /// Remove a token. Removing an unknown token is not an error.
    async fn delete_token(&self, token: &str) -> Result<(), StoreError>;

    /// Record a successful issuance, replacing any previous record.
    async fn upsert_domain_record(
        &self,
        domain: &DomainName,
        creation_date: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Issuance record for a domain.
    async fn get_domain_record(
        &self,
        domain: &DomainName,
    ) -> Result<Option<DomainSslDetails>, StoreError>;

    /// Drop tokens older than `age`, returning how many were removed.
    ///
    /// Tokens orphaned by a crash grant nothing once their challenge has
    /// expired on the authority side; this reclaims them.
    async fn purge_tokens_older_than(&self, age: Duration) -> Result<usize, StoreError>;
}
