//! Protocol seam between the issuance state machine and the authority.
//!
//! [`AcmeClient`](super::AcmeClient) only talks to the authority through
//! these traits. Production uses [`InstantAcmeBackend`](super::InstantAcmeBackend);
//! tests plug in an in-process authority.

use async_trait::async_trait;
use certkeeper_common::DomainName;

use super::error::AcmeError;

/// Order status as reported by the authority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    /// Authorizations outstanding
    Pending,
    /// All authorizations valid, waiting for a CSR
    Ready,
    /// CSR accepted, certificate being issued
    Processing,
    /// Certificate available for download
    Valid,
    /// Order failed permanently
    Invalid,
}

/// Authorization status for one identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    /// Invalid, expired, revoked or deactivated
    Invalid,
}

/// Challenge types an authority may offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    Http01,
    Dns01,
    TlsAlpn01,
    Other,
}

/// One challenge offered for an authorization
#[derive(Debug, Clone)]
pub struct ChallengeInfo {
    pub kind: ChallengeKind,
    /// Challenge URL, used to signal readiness
    pub url: String,
    /// Token chosen by the authority
    pub token: String,
    /// `token.thumbprint(account key)`, the value the solver must serve
    pub key_authorization: String,
    /// Problem reported by the authority, if validation failed
    pub error: Option<String>,
}

/// One authorization of an order
#[derive(Debug, Clone)]
pub struct AuthorizationInfo {
    pub identifier: String,
    pub status: AuthorizationStatus,
    pub challenges: Vec<ChallengeInfo>,
}

/// Authenticated session with a certificate authority
#[async_trait]
pub trait AcmeBackend: Send + Sync {
    /// Authority-assigned account identifier (the account URL)
    fn account_id(&self) -> &str;

    /// Submit a new order naming exactly `domain`
    async fn new_order(&self, domain: &DomainName) -> Result<Box<dyn AcmeOrder>, AcmeError>;
}

/// An order in flight
#[async_trait]
pub trait AcmeOrder: Send {
    /// Current authorizations with their challenges
    async fn authorizations(&mut self) -> Result<Vec<AuthorizationInfo>, AcmeError>;

    /// Ask the authority to validate a challenge
    async fn set_challenge_ready(&mut self, challenge_url: &str) -> Result<(), AcmeError>;

    /// Re-fetch the order and return its status
    async fn refresh(&mut self) -> Result<OrderStatus, AcmeError>;

    /// Submit the DER-encoded CSR
    async fn finalize(&mut self, csr_der: &[u8]) -> Result<(), AcmeError>;

    /// PEM full chain once issued, `None` while still processing
    async fn certificate(&mut self) -> Result<Option<String>, AcmeError>;
}
