//! Embedded key-value storage.
//!
//! # Data Flow
//! ```text
//! wallet registry / local secret backend
//!     → KeyValueStore (namespace, key) → bytes
//!     → redb_store.rs (on-disk, production)
//!     → memory.rs (in-process, tests and ephemeral runs)
//! ```
//!
//! # Design Decisions
//! - Single-key atomic get/set only; no multi-key transactions
//! - Namespaces map to redb tables
//! - Wallet records are keyed by the 16-byte binary form of the wallet id

pub mod memory;
pub mod redb_store;

use thiserror::Error;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("Database error: {0}")]
    Database(#[from] redb::Error),

    /// Filesystem failure while preparing the database path.
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be (de)serialized.
    #[error("Corrupt record in '{namespace}': {message}")]
    Corrupt { namespace: String, message: String },
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Namespaced byte store.
///
/// Implementations must make every single-key operation atomic.
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value. `Ok(None)` when the key is absent.
    fn get(&self, namespace: &str, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Insert or overwrite a value.
    fn set(&self, namespace: &str, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Remove a value. Removing an absent key is not an error.
    fn remove(&self, namespace: &str, key: &[u8]) -> StoreResult<()>;

    /// List every key in a namespace.
    fn keys(&self, namespace: &str) -> StoreResult<Vec<Vec<u8>>>;
}

/// Fetch and decode a JSON record.
pub fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn KeyValueStore,
    namespace: &str,
    key: &[u8],
) -> StoreResult<Option<T>> {
    match store.get(namespace, key)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                namespace: namespace.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Encode and store a JSON record.
pub fn set_json<T: serde::Serialize>(
    store: &dyn KeyValueStore,
    namespace: &str,
    key: &[u8],
    value: &T,
) -> StoreResult<()> {
    let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Corrupt {
        namespace: namespace.to_string(),
        message: e.to_string(),
    })?;
    store.set(namespace, key, &bytes)
}
