//! [`AcmeBackend`] over the `instant-acme` client.

use std::path::PathBuf;

use async_trait::async_trait;
use certkeeper_common::DomainName;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus as AcmeAuthorizationStatus,
    ChallengeType, Identifier, NewAccount, NewOrder, Order, OrderStatus as AcmeOrderStatus,
    Problem,
};
use tracing::{debug, info};

use super::backend::{
    AcmeBackend, AcmeOrder, AuthorizationInfo, AuthorizationStatus, ChallengeInfo,
    ChallengeKind, OrderStatus,
};
use super::error::{AcmeError, StorageError};
use crate::fsutil::{create_private_dir, read_optional, write_atomic, PRIVATE_FILE_MODE};

/// Where and as whom to register
#[derive(Debug, Clone)]
pub struct AccountSettings {
    /// Contact email, registered as a `mailto:` URL
    pub email: String,
    /// Credentials file; holds the PKCS#8 account key
    pub credentials_path: PathBuf,
    /// ACME directory URL
    pub directory_url: String,
}

/// Authority session backed by `instant-acme`
pub struct InstantAcmeBackend {
    account: Account,
    account_id: String,
}

impl InstantAcmeBackend {
    /// Load the stored account, registering a new one only if none exists.
    ///
    /// Authorities key accounts by public key, so reusing the stored key
    /// avoids a fresh registration on every start.
    pub async fn load_or_create(settings: &AccountSettings) -> Result<Self, AcmeError> {
        let path = &settings.credentials_path;

        if let Some(json) = read_optional(path).map_err(StorageError::from)? {
            let credentials: AccountCredentials = serde_json::from_str(&json).map_err(|e| {
                AcmeError::Account(format!(
                    "unreadable account credentials {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let account_id = read_account_id(&json)?;
            let account = Account::from_credentials(credentials).await?;

            info!(
                account_id = %account_id,
                path = %path.display(),
                "Loaded ACME account"
            );
            return Ok(Self {
                account,
                account_id,
            });
        }

        debug!(
            directory = %settings.directory_url,
            "No stored ACME account, registering"
        );

        let contact = format!("mailto:{}", settings.email);
        let (account, credentials) = Account::create(
            &NewAccount {
                contact: &[contact.as_str()],
                terms_of_service_agreed: true,
                only_return_existing: false,
            },
            &settings.directory_url,
            None,
        )
        .await?;

        let json = serde_json::to_string_pretty(&credentials).map_err(StorageError::from)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_private_dir(parent).map_err(StorageError::from)?;
        }
        write_atomic(path, json.as_bytes(), PRIVATE_FILE_MODE).map_err(StorageError::from)?;

        let account_id = read_account_id(&json)?;
        info!(
            account_id = %account_id,
            contact = %settings.email,
            path = %path.display(),
            "Registered new ACME account"
        );

        Ok(Self {
            account,
            account_id,
        })
    }
}

#[async_trait]
impl AcmeBackend for InstantAcmeBackend {
    fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn new_order(&self, domain: &DomainName) -> Result<Box<dyn AcmeOrder>, AcmeError> {
        let identifiers = [Identifier::Dns(domain.to_string())];
        let order = self
            .account
            .new_order(&NewOrder {
                identifiers: &identifiers,
            })
            .await?;

        Ok(Box::new(InstantOrder { order }))
    }
}

struct InstantOrder {
    order: Order,
}

#[async_trait]
impl AcmeOrder for InstantOrder {
    async fn authorizations(&mut self) -> Result<Vec<AuthorizationInfo>, AcmeError> {
        let authorizations = self.order.authorizations().await?;

        Ok(authorizations
            .iter()
            .map(|authz| AuthorizationInfo {
                identifier: identifier_name(&authz.identifier),
                status: match authz.status {
                    AcmeAuthorizationStatus::Pending => AuthorizationStatus::Pending,
                    AcmeAuthorizationStatus::Valid => AuthorizationStatus::Valid,
                    _ => AuthorizationStatus::Invalid,
                },
                challenges: authz
                    .challenges
                    .iter()
                    .map(|challenge| ChallengeInfo {
                        kind: challenge_kind(&challenge.r#type),
                        url: challenge.url.clone(),
                        token: challenge.token.clone(),
                        key_authorization: self
                            .order
                            .key_authorization(challenge)
                            .as_str()
                            .to_string(),
                        error: challenge.error.as_ref().map(problem_detail),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn set_challenge_ready(&mut self, challenge_url: &str) -> Result<(), AcmeError> {
        self.order.set_challenge_ready(challenge_url).await?;
        Ok(())
    }

    async fn refresh(&mut self) -> Result<OrderStatus, AcmeError> {
        let state = self.order.refresh().await?;

        #[allow(unreachable_patterns)]
        let status = match state.status {
            AcmeOrderStatus::Pending => OrderStatus::Pending,
            AcmeOrderStatus::Ready => OrderStatus::Ready,
            AcmeOrderStatus::Processing => OrderStatus::Processing,
            AcmeOrderStatus::Valid => OrderStatus::Valid,
            AcmeOrderStatus::Invalid => OrderStatus::Invalid,
            _ => OrderStatus::Invalid,
        };
        Ok(status)
    }

    async fn finalize(&mut self, csr_der: &[u8]) -> Result<(), AcmeError> {
        self.order.finalize(csr_der).await?;
        Ok(())
    }

    async fn certificate(&mut self) -> Result<Option<String>, AcmeError> {
        Ok(self.order.certificate().await?)
    }
}

impl From<instant_acme::Error> for AcmeError {
    fn from(err: instant_acme::Error) -> Self {
        match err {
            instant_acme::Error::Api(problem) => {
                let detail = problem_detail(&problem);
                if is_transient_problem(&problem) {
                    AcmeError::Transient(detail)
                } else {
                    AcmeError::Rejected(detail)
                }
            }
            // Transport, TLS and response decoding failures
            other => AcmeError::Transient(other.to_string()),
        }
    }
}

/// 5xx, rate limits and stale nonces clear up on their own
fn is_transient_problem(problem: &Problem) -> bool {
    let status = problem.status.unwrap_or(0);
    let kind = problem.r#type.as_deref().unwrap_or("");
    status >= 500
        || status == 429
        || kind.ends_with(":rateLimited")
        || kind.ends_with(":badNonce")
        || kind.ends_with(":serverInternal")
}

fn problem_detail(problem: &Problem) -> String {
    match (&problem.r#type, &problem.detail) {
        (Some(kind), Some(detail)) => format!("{}: {}", kind, detail),
        (None, Some(detail)) => detail.clone(),
        (Some(kind), None) => kind.clone(),
        (None, None) => "unspecified problem".to_string(),
    }
}

fn challenge_kind(kind: &ChallengeType) -> ChallengeKind {
    #[allow(unreachable_patterns)]
    match kind {
        ChallengeType::Http01 => ChallengeKind::Http01,
        ChallengeType::Dns01 => ChallengeKind::Dns01,
        ChallengeType::TlsAlpn01 => ChallengeKind::TlsAlpn01,
        _ => ChallengeKind::Other,
    }
}

fn identifier_name(identifier: &Identifier) -> String {
    #[allow(unreachable_patterns)]
    match identifier {
        Identifier::Dns(name) => name.clone(),
        other => format!("{:?}", other),
    }
}

/// Read the account URL from serialized credentials.
///
/// `AccountCredentials` keeps its fields private; the serialized form
/// carries the identifier under `id`.
fn read_account_id(credentials_json: &str) -> Result<String, AcmeError> {
    let value: serde_json::Value = serde_json::from_str(credentials_json)
        .map_err(|e| AcmeError::Account(format!("invalid credentials JSON: {}", e)))?;

    value
        .get("id")
        .and_then(|id| id.as_str())
        .map(str::to_string)
        .ok_or_else(|| AcmeError::Account("credentials carry no account id".to_string()))
}
