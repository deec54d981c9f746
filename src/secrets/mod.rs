//! Private-key custody.
//!
//! # Data Flow
//! ```text
//! WalletRegistry / WalletSigner
//!     → SecretStore (trait object)
//!         → vault.rs  (remote transit signing, production)
//!         → local.rs  (password-encrypted PEM in the local store, insecure)
//! ```
//!
//! # Security Constraints
//! - Secrets are addressed by wallet name, not wallet id
//! - The vault backend never returns private key bytes
//! - The local backend refuses to start unless explicitly allowed

pub mod cipher;
pub mod local;
pub mod vault;

use std::collections::BTreeMap;

use alloy::primitives::B256;
use async_trait::async_trait;
use thiserror::Error;

use crate::signing::{Algorithm, PublicKey, SigningError, WalletSignature};
use crate::store::StoreError;

pub use local::LocalSecretStore;
pub use vault::VaultSecretStore;

/// Key/value payload of one secret record.
pub type SecretData = BTreeMap<String, String>;

/// Field names inside a secret record.
pub mod fields {
    pub const PRIVATE_KEY: &str = "private_key";
    pub const PUBLIC_KEY: &str = "public_key";
    pub const ALGORITHM: &str = "algorithm";
    pub const CUSTODY: &str = "custody";
}

/// Errors raised by a secret backend.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Secret '{0}' not found")]
    NotFound(String),

    #[error("Secret '{0}' already exists")]
    Conflict(String),

    #[error("Refusing to store empty secret data")]
    EmptyData,

    /// Backend did not answer at startup.
    #[error("Secret backend unreachable: {0}")]
    Unreachable(String),

    #[error("Secret backend is sealed")]
    Sealed,

    /// The local backend was selected without `allow_insecure_local`.
    #[error("Local secret backend is disabled; set secrets.allow_insecure_local to enable it")]
    InsecureBackendDisabled,

    #[error("Secret backend configuration error: {0}")]
    Configuration(String),

    /// Backend answered with an error or an unexpected payload.
    #[error("Secret backend error: {0}")]
    Backend(String),

    #[error("Secret encryption error: {0}")]
    Crypto(String),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for secret backend operations.
pub type SecretResult<T> = Result<T, SecretError>;

/// Capability set of a private-key custody backend.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Reachability check.
    async fn health(&self) -> SecretResult<()>;

    /// Store a new record. Fails `EmptyData` on an empty map and `Conflict`
    /// if a record with this name already exists.
    async fn add_secret(&self, name: &str, data: SecretData) -> SecretResult<()>;

    /// Fetch a record. Fails `NotFound` if absent.
    async fn get_secret(&self, name: &str) -> SecretResult<SecretData>;

    async fn delete_secret(&self, name: &str) -> SecretResult<()>;

    /// Create a key pair under `name` and return its public half.
    async fn generate_key(&self, name: &str, algorithm: Algorithm) -> SecretResult<PublicKey>;

    async fn get_public_key(&self, name: &str, algorithm: Algorithm) -> SecretResult<PublicKey>;

    /// Sign a 32-byte hash with the key stored under `name`.
    async fn sign(
        &self,
        name: &str,
        algorithm: Algorithm,
        hash: B256,
    ) -> SecretResult<WalletSignature>;
}

/// Read the algorithm tag of a stored record.
pub(crate) fn record_algorithm(name: &str, data: &SecretData) -> SecretResult<Algorithm> {
    let tag = data
        .get(fields::ALGORITHM)
        .ok_or_else(|| SecretError::Backend(format!("Secret '{}' has no algorithm tag", name)))?;
    Ok(tag.parse::<Algorithm>()?)
}
