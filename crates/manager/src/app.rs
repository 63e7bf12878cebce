//! Wiring from configuration to running components.
//!
//! Everything is constructed once here and handed down explicitly; no
//! component reaches for shared global state.

use std::sync::Arc;

use anyhow::{Context, Result};
use certkeeper_common::DomainName;
use certkeeper_config::{Config, StoreConfig};
use tracing::{info, warn};

use crate::acme::{
    AccountSettings, AcmeBackend, AcmeClient, CertificateManager, Http01Solver,
    InstantAcmeBackend, KeyMaterialStorage, PollPolicy, RenewalScheduler,
};
use crate::store::{FsTokenStore, MemoryTokenStore, TokenStore};

/// Assembled manager, solver and the configuration they came from
#[derive(Debug)]
pub struct App {
    pub config: Config,
    pub manager: Arc<CertificateManager>,
    pub solver: Http01Solver,
}

impl App {
    /// Load or register the ACME account and assemble everything.
    pub async fn from_config(config: Config) -> Result<Self> {
        let settings = AccountSettings {
            email: config.acme.email.clone(),
            credentials_path: config.acme.account_key.clone(),
            directory_url: config.acme.directory_url().to_string(),
        };

        let backend = InstantAcmeBackend::load_or_create(&settings)
            .await
            .context("Failed to initialize ACME account")?;

        Self::with_backend(config, Arc::new(backend))
    }

    /// Assemble around an already authenticated backend
    pub fn with_backend(config: Config, backend: Arc<dyn AcmeBackend>) -> Result<Self> {
        let tokens = open_store(&config.store)?;

        let storage = KeyMaterialStorage::new(&config.acme.domain_keys, &config.acme.full_chains)
            .context("Failed to initialize key material storage")?;

        let client = AcmeClient::new(backend, Arc::clone(&tokens))
            .with_poll_policy(PollPolicy::from(&config.issuance));

        info!(
            account_id = %client.account_id(),
            directory = %config.acme.directory_url(),
            "Certificate manager ready"
        );

        Ok(Self {
            manager: Arc::new(CertificateManager::new(client, storage)),
            solver: Http01Solver::new(tokens),
            config,
        })
    }

    /// Domains listed in the `renewal` block
    pub fn managed_domains(&self) -> Result<Vec<DomainName>> {
        self.config
            .renewal
            .domains
            .iter()
            .map(|name| {
                DomainName::parse(name).with_context(|| format!("Invalid managed domain {:?}", name))
            })
            .collect()
    }

    /// Scheduler over the managed domains with the configured cadence
    pub fn scheduler(&self) -> Result<RenewalScheduler> {
        Ok(RenewalScheduler::new(
            Arc::clone(&self.manager),
            self.managed_domains()?,
            self.config.renewal.threshold(),
        )
        .with_interval(self.config.renewal.check_interval()))
    }
}

/// Open the configured token store
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn TokenStore>> {
    let store: Arc<dyn TokenStore> = match config {
        StoreConfig::Memory => {
            warn!("Using in-memory token store, domain records will not survive a restart");
            Arc::new(MemoryTokenStore::new())
        }
        StoreConfig::Filesystem { path } => Arc::new(
            FsTokenStore::new(path)
                .with_context(|| format!("Failed to open token store at {}", path.display()))?,
        ),
    };
    Ok(store)
}
