//! Service-level error taxonomy.
//!
//! Each subsystem owns its own error enum; this type folds them together at
//! the operation boundary so the HTTP layer and the scheduler see one shape.

use alloy::primitives::TxHash;
use thiserror::Error;
use uuid::Uuid;

use crate::blockchain::abi::AbiError;
use crate::blockchain::types::BlockchainError;
use crate::platform::PlatformError;
use crate::relay::RelayError;
use crate::secrets::SecretError;
use crate::signing::{Algorithm, SigningError};
use crate::store::StoreError;

/// Errors surfaced by wallet, signing and transaction operations.
#[derive(Debug, Error)]
pub enum KmsError {
    /// Missing or malformed request field.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Wallet creation asked for an algorithm outside {secp256k1, ed25519}.
    #[error("Invalid algorithm '{0}': expected secp256k1 or ed25519")]
    InvalidAlgorithm(String),

    /// The wallet id does not resolve. Wallet ids act as bearer capabilities.
    #[error("Unauthorized wallet id {0}")]
    Unauthorized(Uuid),

    #[error("Wallet {0} not found")]
    NotFound(String),

    /// A secret already exists under this name.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The wallet's algorithm cannot perform the requested operation.
    #[error("Operation '{operation}' is not supported for {algorithm} wallets")]
    UnsupportedForAlgorithm {
        operation: &'static str,
        algorithm: Algorithm,
    },

    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The wallet exists locally but the platform never acknowledged it.
    #[error("Wallet {wallet_id} created but platform registration failed: {source}")]
    WalletNotSynced {
        wallet_id: Uuid,
        #[source]
        source: PlatformError,
    },

    /// The transaction was broadcast but the platform nonce update failed.
    #[error("Transaction {tx_hash} broadcast but platform acknowledgement failed: {source}")]
    AcknowledgeFailed {
        tx_hash: TxHash,
        #[source]
        source: PlatformError,
    },

    #[error(transparent)]
    Secret(SecretError),

    #[error(transparent)]
    Chain(#[from] BlockchainError),

    #[error(transparent)]
    Abi(#[from] AbiError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl From<SecretError> for KmsError {
    fn from(err: SecretError) -> Self {
        match err {
            SecretError::Conflict(name) => {
                KmsError::Conflict(format!("a secret named '{}' already exists", name))
            }
            SecretError::Signing(e) => KmsError::Signing(e),
            other => KmsError::Secret(other),
        }
    }
}

impl KmsError {
    /// True for failures of a remote collaborator (secret backend, chain, platform, relayer).
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            KmsError::Secret(_)
                | KmsError::Chain(_)
                | KmsError::Platform(_)
                | KmsError::Relay(_)
                | KmsError::WalletNotSynced { .. }
                | KmsError::AcknowledgeFailed { .. }
        )
    }
}

/// Result type for service operations.
pub type KmsResult<T> = Result<T, KmsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_conflict_maps_to_conflict() {
        let err: KmsError = SecretError::Conflict("alice".into()).into();
        assert!(matches!(err, KmsError::Conflict(ref m) if m.contains("alice")));
    }

    #[test]
    fn test_secret_signing_error_is_flattened() {
        let err: KmsError = SecretError::Signing(SigningError::InvalidRecoveryId(9)).into();
        assert!(matches!(err, KmsError::Signing(SigningError::InvalidRecoveryId(9))));
    }

    #[test]
    fn test_error_display() {
        let err = KmsError::UnsupportedForAlgorithm {
            operation: "sign_transaction",
            algorithm: Algorithm::Ed25519,
        };
        assert_eq!(
            err.to_string(),
            "Operation 'sign_transaction' is not supported for ed25519 wallets"
        );
        assert!(!err.is_upstream());
        assert!(KmsError::Chain(BlockchainError::Rpc("down".into())).is_upstream());
    }
}
