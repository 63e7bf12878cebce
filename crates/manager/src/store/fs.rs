//! Filesystem-backed token store.
//!
//! # Directory Structure
//!
//! ```text
//! store/
//! ├── tokens/
//! │   └── <token>             # key authorization, one file per challenge
//! └── domains/
//!     └── example.com.json    # DomainSslDetails
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use certkeeper_common::{is_valid_token, DomainName, DomainSslDetails};
use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use crate::fsutil::{create_private_dir, read_optional, write_atomic, PRIVATE_FILE_MODE};
use crate::store::{StoreError, TokenStore};

/// Durable token store rooted at a directory.
///
/// Every write is a temp-file-and-rename, so a solver read racing a write
/// sees either nothing or the complete authorization.
#[derive(Debug)]
pub struct FsTokenStore {
    base_path: PathBuf,
}

impl FsTokenStore {
    /// Open (creating if needed) a store at the given path
    pub fn new(base_path: &Path) -> Result<Self, StoreError> {
        create_private_dir(&base_path.join("tokens"))?;
        create_private_dir(&base_path.join("domains"))?;

        info!(
            store_path = %base_path.display(),
            "Initialized filesystem token store"
        );

        Ok(Self {
            base_path: base_path.to_path_buf(),
        })
    }

    /// Get the store base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn token_path(&self, token: &str) -> PathBuf {
        self.base_path.join("tokens").join(token)
    }

    fn domain_path(&self, domain: &DomainName) -> PathBuf {
        self.base_path
            .join("domains")
            .join(format!("{}.json", domain))
    }
}

#[async_trait]
impl TokenStore for FsTokenStore {
    async fn put_token(&self, token: &str, authorization: &str) -> Result<(), StoreError> {
        if !is_valid_token(token) {
            return Err(StoreError::InvalidToken(token.to_string()));
        }

        write_atomic(
            &self.token_path(token),
            authorization.as_bytes(),
            PRIVATE_FILE_MODE,
        )?;
        trace!(token = %token, "Stored challenge token");
        Ok(())
    }

    async fn get_authorization(&self, token: &str) -> Result<Option<String>, StoreError> {
        if !is_valid_token(token) {
            return Ok(None);
        }
        Ok(read_optional(&self.token_path(token))?)
    }

    async fn delete_token(&self, token: &str) -> Result<(), StoreError> {
        if !is_valid_token(token) {
            return Ok(());
        }

        match fs::remove_file(self.token_path(token)) {
            Ok(()) => {
                trace!(token = %token, "Deleted challenge token");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert_domain_record(
        &self,
        domain: &DomainName,
        creation_date: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let record = DomainSslDetails::new(domain.clone(), creation_date);
        let content = serde_json::to_string_pretty(&record)?;
        write_atomic(
            &self.domain_path(domain),
            content.as_bytes(),
            PRIVATE_FILE_MODE,
        )?;

        debug!(
            domain = %domain,
            creation_date = %creation_date,
            "Saved domain record"
        );
        Ok(())
    }

    async fn get_domain_record(
        &self,
        domain: &DomainName,
    ) -> Result<Option<DomainSslDetails>, StoreError> {
        let Some(content) = read_optional(&self.domain_path(domain))? else {
            trace!(domain = %domain, "No domain record found");
            return Ok(None);
        };

        let record: DomainSslDetails = serde_json::from_str(&content)?;
        if record.domain != *domain {
            return Err(StoreError::Internal(format!(
                "record file for '{}' names '{}'",
                domain, record.domain
            )));
        }
        Ok(Some(record))
    }

    async fn purge_tokens_older_than(&self, age: Duration) -> Result<usize, StoreError> {
        let mut removed = 0usize;

        for entry in fs::read_dir(self.base_path.join("tokens"))? {
            let entry = entry?;
            let modified = entry.metadata()?.modified()?;
            let stale = modified.elapsed().map(|e| e > age).unwrap_or(false);
            if !stale {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(
                        path = %entry.path().display(),
                        error = %e,
                        "Failed to remove stale challenge token"
                    );
                }
            }
        }

        if removed > 0 {
            debug!(removed = removed, "Purged stale challenge tokens");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_store() -> (TempDir, FsTokenStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = FsTokenStore::new(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_store_creation() {
        let (_temp_dir, store) = setup_store();
        assert!(store.base_path().join("tokens").is_dir());
        assert!(store.base_path().join("domains").is_dir());
    }

    #[tokio::test]
    async fn test_token_lifecycle() {
        let (_temp_dir, store) = setup_store();

        store.put_token("abc_123-x", "abc_123-x.thumb").await.unwrap();
        assert_eq!(
            store.get_authorization("abc_123-x").await.unwrap(),
            Some("abc_123-x.thumb".to_string())
        );

        store.delete_token("abc_123-x").await.unwrap();
        assert_eq!(store.get_authorization("abc_123-x").await.unwrap(), None);
        store.delete_token("abc_123-x").await.unwrap();
    }

    #[tokio::test]
    async fn test_traversal_tokens_never_touch_disk() {
        let (temp_dir, store) = setup_store();
        std::fs::write(temp_dir.path().join("secret"), "x").unwrap();

        assert!(store.put_token("../secret", "y").await.is_err());
        assert_eq!(store.get_authorization("../secret").await.unwrap(), None);
        store.delete_token("../secret").await.unwrap();
        assert!(temp_dir.path().join("secret").exists());
    }

    #[tokio::test]
    async fn test_domain_record_survives_reopen() {
        let (temp_dir, store) = setup_store();
        let domain = DomainName::parse("example.test").unwrap();
        let t1 = DateTime::from_timestamp(1_000, 0).unwrap();
        let t2 = DateTime::from_timestamp(2_000, 0).unwrap();

        store.upsert_domain_record(&domain, t1).await.unwrap();
        store.upsert_domain_record(&domain, t2).await.unwrap();
        drop(store);

        let reopened = FsTokenStore::new(temp_dir.path()).unwrap();
        let record = reopened.get_domain_record(&domain).await.unwrap().unwrap();
        assert_eq!(record.creation_date, t2);

        let files = std::fs::read_dir(temp_dir.path().join("domains"))
            .unwrap()
            .count();
        assert_eq!(files, 1);
    }

    #[tokio::test]
    async fn test_missing_domain_record() {
        let (_temp_dir, store) = setup_store();
        let domain = DomainName::parse("unknown.test").unwrap();
        assert!(store.get_domain_record(&domain).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_stale_tokens() {
        let (_temp_dir, store) = setup_store();
        store.put_token("old", "a").await.unwrap();

        assert_eq!(
            store
                .purge_tokens_older_than(Duration::from_secs(3600))
                .await
                .unwrap(),
            0
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            store
                .purge_tokens_older_than(Duration::from_millis(10))
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.get_authorization("old").await.unwrap(), None);
    }
}
