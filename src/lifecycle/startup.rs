//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the store and connect the secret backend
//! - Build the platform, chain and relay clients
//! - Wire registry, transaction builder, relay front end and scheduler
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The secret backend is probed once and never retried

use std::sync::Arc;

use thiserror::Error;

use crate::blockchain::{BlockchainError, ChainClient, ChainRpc, TransactionBuilder};
use crate::config::env::Credentials;
use crate::config::{ConfigError, KmsConfig, SchedulerConfig, SecretBackend};
use crate::http::AppState;
use crate::platform::{PlatformClient, PlatformError, PlatformGateway};
use crate::relay::{GaslessRelay, RelayClient, RelayError, Relayer};
use crate::scheduler::Scheduler;
use crate::secrets::cipher::KeyCipher;
use crate::secrets::{LocalSecretStore, SecretError, SecretStore, VaultSecretStore};
use crate::store::{KeyValueStore, RedbStore, StoreError};
use crate::wallet::WalletRegistry;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("secret backend: {0}")]
    Secret(#[from] SecretError),

    #[error("chain client: {0}")]
    Chain(#[from] BlockchainError),

    #[error("platform client: {0}")]
    Platform(#[from] PlatformError),

    #[error("relay client: {0}")]
    Relay(#[from] RelayError),
}

/// The wired service graph.
#[derive(Clone)]
pub struct Services {
    pub registry: Arc<WalletRegistry>,
    pub builder: Arc<TransactionBuilder>,
    pub relay: Arc<GaslessRelay>,
    pub platform: Arc<dyn PlatformGateway>,
}

impl Services {
    /// Wire already-constructed collaborators together.
    pub fn assemble(
        store: Arc<dyn KeyValueStore>,
        secrets: Arc<dyn SecretStore>,
        platform: Arc<dyn PlatformGateway>,
        chain: Arc<dyn ChainRpc>,
        relayer: Option<Arc<dyn Relayer>>,
    ) -> Self {
        let registry = Arc::new(WalletRegistry::new(store, secrets, platform.clone()));
        let builder = Arc::new(TransactionBuilder::new(
            registry.clone(),
            chain,
            platform.clone(),
        ));
        let relay = Arc::new(GaslessRelay::new(registry.clone(), relayer));
        Self {
            registry,
            builder,
            relay,
            platform,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            registry: self.registry.clone(),
            builder: self.builder.clone(),
            relay: self.relay.clone(),
        }
    }

    pub fn scheduler(&self, config: SchedulerConfig) -> Scheduler {
        Scheduler::new(
            self.registry.clone(),
            self.builder.clone(),
            self.platform.clone(),
            config,
        )
    }
}

/// Build every subsystem from a validated configuration.
pub async fn bootstrap(config: &KmsConfig) -> Result<Services, StartupError> {
    let credentials = Credentials::from_env(config)?;

    // 1. Store
    let store: Arc<dyn KeyValueStore> = Arc::new(RedbStore::open(&config.store.path)?);
    tracing::info!(path = %config.store.path, "Wallet store opened");

    // 2. Secret backend
    let secrets: Arc<dyn SecretStore> = match config.secrets.backend {
        SecretBackend::Vault => {
            let token = credentials.vault_token.ok_or_else(|| {
                SecretError::Configuration("vault backend selected without a token".into())
            })?;
            Arc::new(VaultSecretStore::connect(config.secrets.vault.clone(), token).await?)
        }
        SecretBackend::Local => {
            let password = credentials.wallet_password.ok_or_else(|| {
                SecretError::Configuration("local backend selected without a password".into())
            })?;
            let local = &config.secrets.local;
            let cipher = KeyCipher::new(
                password,
                local.argon2_memory_kib,
                local.argon2_iterations,
                local.argon2_parallelism,
            )?;
            Arc::new(LocalSecretStore::new(
                store.clone(),
                cipher,
                config.secrets.allow_insecure_local,
            )?)
        }
    };
    tracing::info!(backend = secrets.backend(), "Secret backend ready");

    // 3. Platform
    let platform: Arc<dyn PlatformGateway> = Arc::new(PlatformClient::new(
        &config.platform,
        &credentials.platform_auth_token,
    )?);

    // 4. Chain
    let chain: Arc<dyn ChainRpc> = Arc::new(ChainClient::new(config.chain.clone()).await?);

    // 5. Relay (optional)
    let relayer: Option<Arc<dyn Relayer>> = match &config.relay.url {
        Some(url) => {
            tracing::info!(url = %url, "Gasless relay enabled");
            Some(Arc::new(RelayClient::new(url, &config.relay)?))
        }
        None => None,
    };

    Ok(Services::assemble(store, secrets, platform, chain, relayer))
}
