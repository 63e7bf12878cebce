//! In-memory token store.

use crate::store::{StoreError, TokenStore};
use async_trait::async_trait;
use certkeeper_common::{is_valid_token, DomainName, DomainSslDetails};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Token entry with metadata.
#[derive(Debug, Clone)]
struct TokenEntry {
    /// Key authorization served for the token.
    authorization: String,
    /// Creation timestamp.
    created_at: Instant,
}

/// Process-local token store.
///
/// Uses `DashMap` so solver lookups for one token never wait on writes to
/// another. Contents are lost on restart, which is harmless for tokens but
/// forgets domain records.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: DashMap<String, TokenEntry>,
    domains: DashMap<DomainName, DateTime<Utc>>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tokens currently held.
    pub fn pending_tokens(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn put_token(&self, token: &str, authorization: &str) -> Result<(), StoreError> {
        if !is_valid_token(token) {
            return Err(StoreError::InvalidToken(token.to_string()));
        }

        self.tokens.insert(
            token.to_string(),
            TokenEntry {
                authorization: authorization.to_string(),
                created_at: Instant::now(),
            },
        );
        trace!(token = %token, "Stored challenge token");
        Ok(())
    }

    async fn get_authorization(&self, token: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .tokens
            .get(token)
            .map(|entry| entry.authorization.clone()))
    }

    async fn delete_token(&self, token: &str) -> Result<(), StoreError> {
        if self.tokens.remove(token).is_some() {
            trace!(token = %token, "Deleted challenge token");
        }
        Ok(())
    }

    async fn upsert_domain_record(
        &self,
        domain: &DomainName,
        creation_date: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.domains.insert(domain.clone(), creation_date);
        Ok(())
    }

    async fn get_domain_record(
        &self,
        domain: &DomainName,
    ) -> Result<Option<DomainSslDetails>, StoreError> {
        Ok(self
            .domains
            .get(domain)
            .map(|entry| DomainSslDetails::new(domain.clone(), *entry.value())))
    }

    async fn purge_tokens_older_than(&self, age: Duration) -> Result<usize, StoreError> {
        let now = Instant::now();
        let before = self.tokens.len();
        self.tokens
            .retain(|_, entry| now.duration_since(entry.created_at) <= age);
        let removed = before.saturating_sub(self.tokens.len());

        if removed > 0 {
            debug!(removed = removed, "Purged stale challenge tokens");
        }
        Ok(removed)
    }
}
