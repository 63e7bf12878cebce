//! ACME certificate issuance
//!
//! Obtains and renews certificates from Let's Encrypt and compatible CAs
//! using HTTP-01 validation.
//!
//! # Architecture
//!
//! - [`AcmeClient`] - Issuance state machine for one order, over an [`AcmeBackend`]
//! - [`InstantAcmeBackend`] - [`AcmeBackend`] implementation using `instant-acme`
//! - [`Http01Solver`] - Serves published tokens on `/.well-known/acme-challenge/<token>`
//! - [`KeyMaterialStorage`] - Domain keys and full chains on disk
//! - [`CertificateManager`] - Per-domain exclusion, persistence and issuance events
//! - [`RenewalScheduler`] - Background task for checking and renewing certificates
//!
//! # Challenge Flow
//!
//! When a certificate needs to be obtained or renewed:
//!
//! 1. [`AcmeClient`] creates a new order with the ACME server
//! 2. For each authorization, the ACME server offers an HTTP-01 token
//! 3. The token and key authorization are written to the [`TokenStore`](crate::store::TokenStore)
//! 4. Only then is the ACME server told the challenge is ready
//! 5. The ACME server requests `/.well-known/acme-challenge/<token>` and
//!    [`Http01Solver`] answers from the store
//! 6. Once validated, the tokens are deleted and [`AcmeClient`] finalizes
//!    the order with a CSR for a fresh domain key
//! 7. [`CertificateManager`] writes key and chain, records the issuance and
//!    publishes a [`CertificateEvent`]

mod backend;
mod backoff;
mod challenge;
mod client;
mod error;
mod instant;
mod locks;
mod manager;
mod scheduler;
mod storage;

pub use backend::{
    AcmeBackend, AcmeOrder, AuthorizationInfo, AuthorizationStatus, ChallengeInfo,
    ChallengeKind, OrderStatus,
};
pub use backoff::PollPolicy;
pub use challenge::{Http01Solver, ACME_CHALLENGE_PREFIX};
pub use client::{AcmeClient, IssuanceState};
pub use error::{AcmeError, ErrorKind, StorageError};
pub use instant::{AccountSettings, InstantAcmeBackend};
pub use locks::{DomainGuard, DomainLocks};
pub use manager::{
    check_renewal, renewal_due, CertificateEvent, CertificateManager, Operation, RenewalCheck,
};
pub use scheduler::{RenewalScheduler, RenewalSummary};
pub use storage::{chain_expiry, KeyMaterialStorage};
