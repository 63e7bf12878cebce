//! In-process certificate authority for integration tests.
//!
//! Validates HTTP-01 challenges by fetching them from a running solver over
//! real HTTP, then mints self-signed chains with a configurable lifetime.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use certkeeper::acme::{
    AcmeBackend, AcmeOrder, AuthorizationInfo, AuthorizationStatus, ChallengeInfo,
    ChallengeKind, OrderStatus, PollPolicy,
};
use certkeeper::{AcmeClient, AcmeError, CertificateManager, Http01Solver, KeyMaterialStorage};
use certkeeper::{MemoryTokenStore, TokenStore};
use certkeeper_common::DomainName;
use parking_lot::Mutex;
use rcgen::{CertificateParams, KeyPair};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub const THUMBPRINT: &str = "fake-account-thumbprint";

/// How the authority probes the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Request the token it handed out
    Correct,
    /// Request a token that was never handed out
    UnknownToken,
}

/// One validation request made by the authority
#[derive(Debug, Clone)]
pub struct ProbeRecord {
    pub token: String,
    pub status: u16,
    pub body: String,
}

pub struct FakeAuthority {
    solver_url: String,
    http: reqwest::Client,
    probe: Mutex<Probe>,
    failing: Mutex<HashSet<String>>,
    validity_days: AtomicI64,
    validation_delay: Mutex<Duration>,
    orders: AtomicUsize,
    finalized: AtomicUsize,
    probes: Mutex<Vec<ProbeRecord>>,
}

impl FakeAuthority {
    pub fn new(solver_url: String) -> Self {
        Self {
            solver_url,
            http: reqwest::Client::builder().no_proxy().build().unwrap(),
            probe: Mutex::new(Probe::Correct),
            failing: Mutex::new(HashSet::new()),
            validity_days: AtomicI64::new(90),
            validation_delay: Mutex::new(Duration::from_millis(20)),
            orders: AtomicUsize::new(0),
            finalized: AtomicUsize::new(0),
            probes: Mutex::new(Vec::new()),
        }
    }

    pub fn set_probe(&self, probe: Probe) {
        *self.probe.lock() = probe;
    }

    /// Probe the wrong token for this domain only
    pub fn fail_domain(&self, domain: &str) {
        self.failing.lock().insert(domain.to_string());
    }

    pub fn set_validity_days(&self, days: i64) {
        self.validity_days.store(days, Ordering::SeqCst);
    }

    pub fn set_validation_delay(&self, delay: Duration) {
        *self.validation_delay.lock() = delay;
    }

    pub fn orders(&self) -> usize {
        self.orders.load(Ordering::SeqCst)
    }

    pub fn finalized(&self) -> usize {
        self.finalized.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> Vec<ProbeRecord> {
        self.probes.lock().clone()
    }

    async fn validate(&self, domain: &str, token: &str, expected: &str) -> Result<(), String> {
        let probe = if self.failing.lock().contains(domain) {
            Probe::UnknownToken
        } else {
            *self.probe.lock()
        };
        let requested = match probe {
            Probe::Correct => token.to_string(),
            Probe::UnknownToken => format!("{}-never-issued", token),
        };

        let url = format!("{}/.well-known/acme-challenge/{}", self.solver_url, requested);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("connection: {}", e))?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        self.probes.lock().push(ProbeRecord {
            token: requested,
            status,
            body: body.clone(),
        });

        if status == 200 && body == expected {
            Ok(())
        } else {
            Err(format!(
                "urn:ietf:params:acme:error:unauthorized: solver answered {}",
                status
            ))
        }
    }
}

struct OrderState {
    status: OrderStatus,
    authorization: AuthorizationStatus,
    error: Option<String>,
    chain: Option<String>,
}

struct FakeOrder {
    authority: Arc<FakeAuthority>,
    domain: String,
    token: String,
    state: Arc<Mutex<OrderState>>,
}

/// Backend handle owning an `Arc` to the authority so orders can validate
/// in the background
#[derive(Clone)]
pub struct SharedAuthority(pub Arc<FakeAuthority>);

#[async_trait]
impl AcmeBackend for SharedAuthority {
    fn account_id(&self) -> &str {
        "https://fake.test/acme/acct/1"
    }

    async fn new_order(&self, domain: &DomainName) -> Result<Box<dyn AcmeOrder>, AcmeError> {
        let serial = self.0.orders.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeOrder {
            authority: Arc::clone(&self.0),
            domain: domain.to_string(),
            token: format!("tok_{}_{}", serial, domain.as_str().replace('.', "-")),
            state: Arc::new(Mutex::new(OrderState {
                status: OrderStatus::Pending,
                authorization: AuthorizationStatus::Pending,
                error: None,
                chain: None,
            })),
        }))
    }
}

impl FakeOrder {
    fn key_authorization(&self) -> String {
        format!("{}.{}", self.token, THUMBPRINT)
    }
}

#[async_trait]
impl AcmeOrder for FakeOrder {
    async fn authorizations(&mut self) -> Result<Vec<AuthorizationInfo>, AcmeError> {
        let state = self.state.lock();
        Ok(vec![AuthorizationInfo {
            identifier: self.domain.clone(),
            status: state.authorization,
            challenges: vec![
                ChallengeInfo {
                    kind: ChallengeKind::Dns01,
                    url: format!("https://fake.test/chall/{}/dns", self.token),
                    token: format!("{}_dns", self.token),
                    key_authorization: "unused".to_string(),
                    error: None,
                },
                ChallengeInfo {
                    kind: ChallengeKind::Http01,
                    url: format!("https://fake.test/chall/{}/http", self.token),
                    token: self.token.clone(),
                    key_authorization: self.key_authorization(),
                    error: state.error.clone(),
                },
            ],
        }])
    }

    async fn set_challenge_ready(&mut self, _challenge_url: &str) -> Result<(), AcmeError> {
        let authority = Arc::clone(&self.authority);
        let state = Arc::clone(&self.state);
        let domain = self.domain.clone();
        let token = self.token.clone();
        let expected = self.key_authorization();
        let delay = *authority.validation_delay.lock();

        // The authority validates on its own schedule
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let outcome = authority.validate(&domain, &token, &expected).await;

            let mut state = state.lock();
            match outcome {
                Ok(()) => {
                    state.authorization = AuthorizationStatus::Valid;
                    state.status = OrderStatus::Ready;
                }
                Err(detail) => {
                    state.authorization = AuthorizationStatus::Invalid;
                    state.status = OrderStatus::Invalid;
                    state.error = Some(detail);
                }
            }
        });
        Ok(())
    }

    async fn refresh(&mut self) -> Result<OrderStatus, AcmeError> {
        Ok(self.state.lock().status)
    }

    async fn finalize(&mut self, csr_der: &[u8]) -> Result<(), AcmeError> {
        if csr_der.is_empty() {
            return Err(AcmeError::Rejected("empty CSR".to_string()));
        }
        let mut state = self.state.lock();
        if state.status != OrderStatus::Ready {
            return Err(AcmeError::Rejected("order not ready".to_string()));
        }

        let days = self.authority.validity_days.load(Ordering::SeqCst);
        state.chain = Some(mint_chain(&self.domain, days));
        state.status = OrderStatus::Valid;
        self.authority.finalized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn certificate(&mut self) -> Result<Option<String>, AcmeError> {
        Ok(self.state.lock().chain.clone())
    }
}

/// Self-signed chain for `domain` valid for `days` from now
pub fn mint_chain(domain: &str, days: i64) -> String {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec![domain.to_string()]).unwrap();
    params.not_before = time::OffsetDateTime::now_utc() - time::Duration::hours(1);
    params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(days);
    params.self_signed(&key).unwrap().pem()
}

pub fn fast_polling() -> PollPolicy {
    PollPolicy {
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        timeout: Duration::from_secs(5),
    }
}

/// Start a solver on an ephemeral port, returning its base URL
pub async fn start_solver(
    tokens: Arc<dyn TokenStore>,
    shutdown: &CancellationToken,
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(Http01Solver::new(tokens).serve(listener, shutdown.clone()));
    format!("http://{}", address)
}

/// Everything a scenario needs, torn down with the temp dir
pub struct Harness {
    pub temp: TempDir,
    pub tokens: Arc<MemoryTokenStore>,
    pub authority: Arc<FakeAuthority>,
    pub manager: Arc<CertificateManager>,
    pub solver_url: String,
    pub shutdown: CancellationToken,
}

impl Harness {
    pub async fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let tokens = Arc::new(MemoryTokenStore::new());
        let shutdown = CancellationToken::new();

        let solver_url = start_solver(tokens.clone(), &shutdown).await;
        let authority = Arc::new(FakeAuthority::new(solver_url.clone()));

        let client = AcmeClient::new(
            Arc::new(SharedAuthority(Arc::clone(&authority))),
            tokens.clone(),
        )
        .with_poll_policy(fast_polling());
        let storage =
            KeyMaterialStorage::new(&temp.path().join("keys"), &temp.path().join("certs"))
                .unwrap();

        Self {
            manager: Arc::new(CertificateManager::new(client, storage)),
            temp,
            tokens,
            authority,
            solver_url,
            shutdown,
        }
    }

    pub fn http(&self) -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub fn domain(name: &str) -> DomainName {
    DomainName::parse(name).unwrap()
}
