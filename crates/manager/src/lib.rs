//! Certkeeper Library
//!
//! Keeps TLS certificates for a set of domains issued and renewed through
//! an ACME certificate authority, proving domain control with HTTP-01.
//!
//! - **Token store**: challenge tokens and per-domain issuance records
//! - **Challenge solver**: plain-HTTP responder for the authority's probes
//! - **ACME client**: the order state machine, one attempt at a time
//! - **Certificate manager**: per-domain exclusion, key material on disk,
//!   issuance events
//! - **Renewal scheduler**: periodic checks against a validity threshold
//!
//! # Example
//!
//! ```ignore
//! use certkeeper::App;
//! use certkeeper_config::Config;
//! use tokio_util::sync::CancellationToken;
//!
//! let app = App::from_config(Config::from_file("certkeeper.kdl")?).await?;
//! let domain = "example.com".parse()?;
//! app.manager.issue(&domain, &CancellationToken::new()).await?;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod acme;
pub mod app;
pub mod store;

mod fsutil;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Wiring
pub use app::{open_store, App};

// Issuance
pub use acme::{
    check_renewal, renewal_due, AcmeClient, AcmeError, CertificateEvent, CertificateManager,
    ErrorKind, Http01Solver, IssuanceState, KeyMaterialStorage, RenewalCheck, RenewalScheduler,
};

// Persistence
pub use store::{FsTokenStore, MemoryTokenStore, StoreError, TokenStore};
