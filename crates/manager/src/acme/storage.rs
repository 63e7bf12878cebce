//! Key material storage
//!
//! Domain private keys and full chains live on disk under two separately
//! configured roots, named after the domain and overwritten in place on
//! renewal.
//!
//! # Directory Structure
//!
//! ```text
//! domain-keys/
//! └── example.com.key       # PKCS#8 private key, 0600
//! full-chains/
//! └── example.com.crt       # Leaf + intermediates, 0644
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use certkeeper_common::{DomainName, IssuedCertificate};
use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};
use x509_parser::pem::Pem;

use super::error::StorageError;
use crate::fsutil::{
    create_private_dir, read_optional, stage, write_atomic, PRIVATE_FILE_MODE, PUBLIC_FILE_MODE,
};

/// Filesystem storage for issued keys and chains
#[derive(Debug, Clone)]
pub struct KeyMaterialStorage {
    key_root: PathBuf,
    chain_root: PathBuf,
}

impl KeyMaterialStorage {
    /// Open storage at the given roots, creating them if needed.
    ///
    /// The key root is restricted to the owner (0700 on Unix).
    pub fn new(key_root: &Path, chain_root: &Path) -> Result<Self, StorageError> {
        create_private_dir(key_root)?;
        fs::create_dir_all(chain_root)?;

        info!(
            key_root = %key_root.display(),
            chain_root = %chain_root.display(),
            "Initialized key material storage"
        );

        Ok(Self {
            key_root: key_root.to_path_buf(),
            chain_root: chain_root.to_path_buf(),
        })
    }

    /// Path of the private key for a domain
    pub fn key_path(&self, domain: &DomainName) -> PathBuf {
        self.key_root.join(format!("{}.key", domain))
    }

    /// Path of the full chain for a domain
    pub fn chain_path(&self, domain: &DomainName) -> PathBuf {
        self.chain_root.join(format!("{}.crt", domain))
    }

    /// Persist key and chain.
    ///
    /// Both files are staged in full before either is renamed into place.
    /// If the chain cannot be swapped in, the previous key is put back, so a
    /// failed save never leaves a new key next to the old chain.
    pub fn save(&self, issued: &IssuedCertificate) -> Result<(), StorageError> {
        let key_path = self.key_path(&issued.domain);
        let chain_path = self.chain_path(&issued.domain);

        let staged_key = stage(&key_path, issued.key_pem.as_bytes(), PRIVATE_FILE_MODE)?;
        let staged_chain = stage(&chain_path, issued.chain_pem.as_bytes(), PUBLIC_FILE_MODE)?;
        let previous_key = read_optional(&key_path)?;

        staged_key.persist(&key_path).map_err(|e| e.error)?;
        if let Err(e) = staged_chain.persist(&chain_path) {
            restore_key(&key_path, previous_key.as_deref());
            return Err(e.error.into());
        }

        debug!(
            domain = %issued.domain,
            key = %key_path.display(),
            chain = %chain_path.display(),
            expires = %issued.expires,
            "Saved key material"
        );
        Ok(())
    }

    /// Stored full chain, `None` if never issued
    pub fn load_chain(&self, domain: &DomainName) -> Result<Option<String>, StorageError> {
        let chain = read_optional(&self.chain_path(domain))?;
        if chain.is_none() {
            trace!(domain = %domain, "No stored chain");
        }
        Ok(chain)
    }

    /// `notAfter` of the stored leaf certificate
    pub fn certificate_expiry(
        &self,
        domain: &DomainName,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        match self.load_chain(domain)? {
            Some(chain) => chain_expiry(&chain).map(Some),
            None => Ok(None),
        }
    }

    /// Key and chain paths, if both exist
    pub fn certificate_paths(&self, domain: &DomainName) -> Option<(PathBuf, PathBuf)> {
        let chain = self.chain_path(domain);
        let key = self.key_path(domain);
        (chain.exists() && key.exists()).then_some((chain, key))
    }
}

/// Put back the key that matched the chain still on disk
fn restore_key(key_path: &Path, previous: Option<&str>) {
    let restored = match previous {
        Some(pem) => write_atomic(key_path, pem.as_bytes(), PRIVATE_FILE_MODE),
        None => fs::remove_file(key_path),
    };
    if let Err(e) = restored {
        warn!(
            key = %key_path.display(),
            error = %e,
            "Failed to restore previous key after chain write failed"
        );
    }
}

/// Expiry of the first (leaf) certificate in a PEM chain
pub fn chain_expiry(chain_pem: &str) -> Result<DateTime<Utc>, StorageError> {
    let pem = Pem::iter_from_buffer(chain_pem.as_bytes())
        .next()
        .ok_or_else(|| StorageError::InvalidCertificate("no PEM block found".to_string()))?
        .map_err(|e| StorageError::InvalidCertificate(e.to_string()))?;

    let cert = pem
        .parse_x509()
        .map_err(|e| StorageError::InvalidCertificate(e.to_string()))?;

    let not_after = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(not_after, 0).ok_or_else(|| {
        StorageError::InvalidCertificate(format!("notAfter out of range: {}", not_after))
    })
}
