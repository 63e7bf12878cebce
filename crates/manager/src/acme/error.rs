//! ACME error types

use std::time::Duration;

use certkeeper_common::DomainName;
use thiserror::Error;

use crate::store::StoreError;

/// Broad classification callers base their retry policy on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network trouble, authority 5xx, rate limiting, timeouts
    Transient,
    /// The authority rejected the order or the challenge; retrying will
    /// fail the same way until the cause is fixed externally
    Validation,
    /// A local fault: the token store, key material or account
    /// credentials could not be read or written, or key generation failed
    Persistence,
    /// Another issuance for the same domain is running
    Busy,
    /// The caller cancelled the flow
    Cancelled,
}

impl ErrorKind {
    /// Whether the same request may succeed if simply tried again.
    ///
    /// Persistence failures count as retryable: the next attempt restarts
    /// from a fresh order and rewrites everything.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::Persistence)
    }
}

/// Errors surfaced by an issuance or renewal attempt
#[derive(Debug, Error)]
pub enum AcmeError {
    #[error("certificate authority unavailable: {0}")]
    Transient(String),

    #[error("timed out after {waited:?} waiting for {stage}")]
    Timeout { stage: &'static str, waited: Duration },

    #[error("certificate authority rejected the request: {0}")]
    Rejected(String),

    #[error("account error: {0}")]
    Account(String),

    #[error("no HTTP-01 challenge offered for {0}")]
    NoHttp01Challenge(String),

    #[error("challenge for {domain} failed: {detail}")]
    ChallengeFailed { domain: String, detail: String },

    #[error("order became invalid: {0}")]
    OrderInvalid(String),

    #[error("failed to generate domain key or CSR: {0}")]
    KeyGeneration(String),

    #[error("token store error: {0}")]
    Store(#[from] StoreError),

    #[error("certificate storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("concurrent operation in progress for {0}")]
    InProgress(DomainName),

    #[error("issuance cancelled")]
    Cancelled,
}

impl AcmeError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) | Self::Timeout { .. } => ErrorKind::Transient,
            Self::Rejected(_)
            | Self::NoHttp01Challenge(_)
            | Self::ChallengeFailed { .. }
            | Self::OrderInvalid(_) => ErrorKind::Validation,
            Self::Store(_) | Self::Storage(_) | Self::Account(_) | Self::KeyGeneration(_) => {
                ErrorKind::Persistence
            }
            Self::InProgress(_) => ErrorKind::Busy,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Shorthand for `self.kind().is_retryable()`
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Key material storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid certificate chain: {0}")]
    InvalidCertificate(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
