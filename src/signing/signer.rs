//! Algorithm dispatch for signing a 32-byte hash.
//!
//! # Security
//! - Private keys never appear in logs; `Debug` is redacted
//! - PEM encodings are returned as [`SecretString`]

use std::sync::Arc;

use alloy::primitives::{Address, Signature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use secrecy::SecretString;

use crate::error::{KmsError, KmsResult};
use crate::observability::metrics;
use crate::secrets::SecretStore;
use crate::signing::types::{Algorithm, PublicKey, SigningError, WalletSignature};
use crate::wallet::Wallet;

/// Private key material, tagged by algorithm.
pub enum PrivateKey {
    Secp256k1(k256::SecretKey),
    Ed25519(ed25519_dalek::SigningKey),
}

impl PrivateKey {
    /// Generate a fresh key from the OS RNG.
    pub fn generate(algorithm: Algorithm) -> Self {
        let mut rng = rand::rngs::OsRng;
        match algorithm {
            Algorithm::Secp256k1 => PrivateKey::Secp256k1(k256::SecretKey::random(&mut rng)),
            Algorithm::Ed25519 => PrivateKey::Ed25519(ed25519_dalek::SigningKey::generate(&mut rng)),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            PrivateKey::Secp256k1(_) => Algorithm::Secp256k1,
            PrivateKey::Ed25519(_) => Algorithm::Ed25519,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::Secp256k1(key) => PublicKey::Secp256k1(key.public_key()),
            PrivateKey::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
        }
    }

    /// Sign a prehashed message.
    ///
    /// secp256k1 yields `r || s || v` with raw `v` in {0, 1}; ed25519 signs
    /// the 32 hash bytes directly and yields 64 bytes.
    pub fn sign(&self, hash: &B256) -> Result<WalletSignature, SigningError> {
        match self {
            PrivateKey::Secp256k1(key) => {
                let signer = PrivateKeySigner::from_signing_key(key.into());
                let signature = signer
                    .sign_hash_sync(hash)
                    .map_err(|e| SigningError::Failed(e.to_string()))?;
                Ok(WalletSignature::from(signature))
            }
            PrivateKey::Ed25519(key) => {
                use ed25519_dalek::Signer;
                Ok(WalletSignature::Ed25519(key.sign(hash.as_slice()).to_bytes()))
            }
        }
    }

    /// PKCS#8 PEM encoding.
    pub fn to_pkcs8_pem(&self) -> Result<SecretString, SigningError> {
        let pem = match self {
            PrivateKey::Secp256k1(key) => {
                use k256::pkcs8::{EncodePrivateKey, LineEnding};
                key.to_pkcs8_pem(LineEnding::LF)
                    .map_err(|e| SigningError::Key(e.to_string()))?
                    .to_string()
            }
            PrivateKey::Ed25519(key) => {
                use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
                use ed25519_dalek::pkcs8::EncodePrivateKey;
                key.to_pkcs8_pem(LineEnding::LF)
                    .map_err(|e| SigningError::Key(e.to_string()))?
                    .to_string()
            }
        };
        Ok(SecretString::from(pem))
    }

    pub fn from_pkcs8_pem(algorithm: Algorithm, pem: &str) -> Result<Self, SigningError> {
        match algorithm {
            Algorithm::Secp256k1 => {
                use k256::pkcs8::DecodePrivateKey;
                k256::SecretKey::from_pkcs8_pem(pem)
                    .map(PrivateKey::Secp256k1)
                    .map_err(|e| SigningError::Key(e.to_string()))
            }
            Algorithm::Ed25519 => {
                use ed25519_dalek::pkcs8::DecodePrivateKey;
                ed25519_dalek::SigningKey::from_pkcs8_pem(pem)
                    .map(PrivateKey::Ed25519)
                    .map_err(|e| SigningError::Key(e.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey")
            .field(&self.algorithm())
            .field(&"[REDACTED]")
            .finish()
    }
}

/// A wallet bound to the secret backend that holds its key.
#[derive(Clone)]
pub struct WalletSigner {
    wallet: Wallet,
    secrets: Arc<dyn SecretStore>,
}

impl WalletSigner {
    pub fn new(wallet: Wallet, secrets: Arc<dyn SecretStore>) -> Self {
        Self { wallet, secrets }
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Ethereum address, or `UnsupportedForAlgorithm` for non-secp256k1 wallets.
    pub fn eth_address(&self, operation: &'static str) -> KmsResult<Address> {
        self.wallet.eth_address(operation)
    }

    /// Sign a 32-byte hash with the wallet's key.
    pub async fn sign_hash(&self, hash: B256) -> KmsResult<WalletSignature> {
        let signature = self
            .secrets
            .sign(&self.wallet.name, self.wallet.algorithm, hash)
            .await?;

        if signature.algorithm() != self.wallet.algorithm {
            return Err(SigningError::InvalidSignatureLength {
                expected: self.wallet.algorithm.signature_len(),
                actual: signature.as_bytes().len(),
            }
            .into());
        }

        metrics::record_signature(self.wallet.algorithm.as_str());
        Ok(signature)
    }

    /// Sign a hash and return a recoverable Ethereum signature.
    pub async fn sign_ethereum(
        &self,
        hash: B256,
        operation: &'static str,
    ) -> KmsResult<Signature> {
        self.eth_address(operation)?;
        let signature = self.sign_hash(hash).await?;
        signature.to_eth_signature().map_err(KmsError::from)
    }
}

impl std::fmt::Debug for WalletSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSigner")
            .field("wallet_id", &self.wallet.wallet_id)
            .field("algorithm", &self.wallet.algorithm)
            .field("backend", &self.secrets.backend())
            .finish()
    }
}
