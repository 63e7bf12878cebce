//! Certificate manager
//!
//! Top-level entry point: serialises issuance per domain, persists what the
//! client returns and records it in the token store.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use certkeeper_common::{AttemptId, DomainName, DomainSslDetails, IssuedCertificate};
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::client::{AcmeClient, IssuanceState};
use super::error::{AcmeError, StorageError};
use super::locks::DomainLocks;
use super::storage::KeyMaterialStorage;
use crate::store::TokenStore;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Why an issuance was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Issue,
    Renew,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Issue => f.write_str("issue"),
            Self::Renew => f.write_str("renew"),
        }
    }
}

/// Published after key material is on disk and the record is written.
///
/// Consumers (a TLS terminator, a reload hook) reload the files named by
/// the manager's storage paths. Nothing restarts on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateEvent {
    Issued {
        domain: DomainName,
        operation: Operation,
        creation_date: DateTime<Utc>,
        expires: DateTime<Utc>,
    },
}

/// Drives issuance and renewal for any number of domains
pub struct CertificateManager {
    client: AcmeClient,
    storage: KeyMaterialStorage,
    locks: DomainLocks,
    events: broadcast::Sender<CertificateEvent>,
}

impl CertificateManager {
    pub fn new(client: AcmeClient, storage: KeyMaterialStorage) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            client,
            storage,
            locks: DomainLocks::new(),
            events,
        }
    }

    /// Receive an event for every successful issuance
    pub fn subscribe(&self) -> broadcast::Receiver<CertificateEvent> {
        self.events.subscribe()
    }

    pub fn storage(&self) -> &KeyMaterialStorage {
        &self.storage
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        self.client.tokens()
    }

    /// Obtain a certificate for `domain`, replacing any existing one
    pub async fn issue(
        &self,
        domain: &DomainName,
        cancel: &CancellationToken,
    ) -> Result<DomainSslDetails, AcmeError> {
        self.execute(domain, Operation::Issue, cancel).await
    }

    /// Re-run the full order for a domain nearing expiry
    pub async fn renew(
        &self,
        domain: &DomainName,
        cancel: &CancellationToken,
    ) -> Result<DomainSslDetails, AcmeError> {
        self.execute(domain, Operation::Renew, cancel).await
    }

    /// Whether `domain` should be (re)issued now.
    ///
    /// Decided by the stored chain's expiry; a domain without a readable
    /// chain always needs issuance.
    pub async fn needs_renewal(
        &self,
        domain: &DomainName,
        threshold: Duration,
    ) -> Result<bool, AcmeError> {
        let check =
            check_renewal(self.client.tokens().as_ref(), &self.storage, domain, threshold).await?;
        Ok(check.due)
    }

    /// `notAfter` of the stored certificate for `domain`
    pub async fn certificate_expiry(
        &self,
        domain: &DomainName,
    ) -> Result<Option<DateTime<Utc>>, AcmeError> {
        Ok(self.storage.certificate_expiry(domain)?)
    }

    async fn execute(
        &self,
        domain: &DomainName,
        operation: Operation,
        cancel: &CancellationToken,
    ) -> Result<DomainSslDetails, AcmeError> {
        let attempt = AttemptId::new();

        // Claimed before the first await, so of two concurrent calls the
        // second is always the one rejected
        let Some(_guard) = self.locks.try_acquire(domain, &attempt) else {
            info!(
                domain = %domain,
                operation = %operation,
                "Rejected: another operation holds this domain"
            );
            return Err(AcmeError::InProgress(domain.clone()));
        };

        let span = info_span!(
            "certificate",
            domain = %domain,
            attempt = %attempt,
            operation = %operation
        );

        async move {
            let started = Instant::now();
            info!("Starting certificate {}", operation);

            match self.run(domain, operation, cancel).await {
                Ok(details) => {
                    info!(
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Certificate {} complete",
                        operation
                    );
                    Ok(details)
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        kind = ?e.kind(),
                        retryable = e.is_retryable(),
                        "Certificate {} failed",
                        operation
                    );
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        domain: &DomainName,
        operation: Operation,
        cancel: &CancellationToken,
    ) -> Result<DomainSslDetails, AcmeError> {
        let issued = self.client.issue(domain, cancel).await?;
        self.persist(&issued, operation).await
    }

    /// The `Issued` transition: key material, then the record, then the
    /// event
    async fn persist(
        &self,
        issued: &IssuedCertificate,
        operation: Operation,
    ) -> Result<DomainSslDetails, AcmeError> {
        self.storage.save(issued)?;

        let creation_date = Utc::now();
        self.client
            .tokens()
            .upsert_domain_record(&issued.domain, creation_date)
            .await?;

        debug!(
            domain = %issued.domain,
            from = %IssuanceState::Finalizing,
            to = %IssuanceState::Issued,
            "Issuance state transition"
        );
        info!(
            domain = %issued.domain,
            expires = %issued.expires,
            key = %self.storage.key_path(&issued.domain).display(),
            chain = %self.storage.chain_path(&issued.domain).display(),
            "Certificate issued"
        );

        // No subscribers is fine
        let _ = self.events.send(CertificateEvent::Issued {
            domain: issued.domain.clone(),
            operation,
            creation_date,
            expires: issued.expires,
        });

        Ok(DomainSslDetails::new(issued.domain.clone(), creation_date))
    }
}

impl fmt::Debug for CertificateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateManager")
            .field("client", &self.client)
            .field("storage", &self.storage)
            .finish()
    }
}

/// What is known about a domain's current certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalCheck {
    pub record: Option<DomainSslDetails>,
    pub expiry: Option<DateTime<Utc>>,
    pub due: bool,
}

/// Gather the record and stored chain for `domain` and decide renewal.
///
/// A readable chain alone decides: the record only says whether the domain
/// was ever issued through this store, and a fresh in-memory store has none
/// after every restart. Without a readable chain the domain is due.
///
/// Needs no account, so it also serves offline status checks.
pub async fn check_renewal(
    tokens: &dyn TokenStore,
    storage: &KeyMaterialStorage,
    domain: &DomainName,
    threshold: Duration,
) -> Result<RenewalCheck, AcmeError> {
    let record = tokens.get_domain_record(domain).await?;
    let expiry = match storage.certificate_expiry(domain) {
        Ok(expiry) => expiry,
        Err(StorageError::InvalidCertificate(reason)) => {
            warn!(
                domain = %domain,
                chain = %storage.chain_path(domain).display(),
                reason = %reason,
                "Stored chain is unreadable, treating as missing"
            );
            None
        }
        Err(e) => return Err(e.into()),
    };

    let due = match expiry {
        Some(expiry) => {
            let threshold = TimeDelta::from_std(threshold).unwrap_or(TimeDelta::MAX);
            let due = renewal_due(expiry, Utc::now(), threshold);
            debug!(
                domain = %domain,
                issued = ?record.as_ref().map(|r| r.creation_date),
                expires = %expiry,
                due = due,
                "Checked renewal"
            );
            due
        }
        None => {
            match &record {
                Some(record) => warn!(
                    domain = %domain,
                    issued = %record.creation_date,
                    "Issuance record without a stored chain"
                ),
                None => debug!(domain = %domain, "No stored certificate"),
            }
            true
        }
    };

    Ok(RenewalCheck {
        record,
        expiry,
        due,
    })
}

/// Whether a certificate expiring at `expiry` is due for renewal at `now`.
///
/// Due when strictly less than `threshold` validity remains; exactly
/// `threshold` left is not yet due.
pub fn renewal_due(expiry: DateTime<Utc>, now: DateTime<Utc>, threshold: TimeDelta) -> bool {
    expiry.signed_duration_since(now) < threshold
}
