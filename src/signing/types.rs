//! Algorithm tags, public keys and algorithm-shaped signatures.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{keccak256, Address, Signature, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while producing or interpreting a signature.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Algorithm tag outside the supported set.
    #[error("Unsupported algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    /// Signature does not have the shape its algorithm requires.
    #[error("Invalid signature length: expected {expected} bytes, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    /// Recovery byte is not one of 27/28 after normalization.
    #[error("Invalid recovery id {0}")]
    InvalidRecoveryId(u8),

    /// Key material could not be encoded or decoded.
    #[error("Key encoding error: {0}")]
    Key(String),

    /// The cryptographic operation itself failed.
    #[error("Signing failed: {0}")]
    Failed(String),
}

/// Key algorithm of a wallet. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Secp256k1,
    Ed25519,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Secp256k1 => "secp256k1",
            Algorithm::Ed25519 => "ed25519",
        }
    }

    /// Length of a signature produced under this algorithm.
    pub fn signature_len(&self) -> usize {
        match self {
            Algorithm::Secp256k1 => 65,
            Algorithm::Ed25519 => 64,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = SigningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "secp256k1" => Ok(Algorithm::Secp256k1),
            "ed25519" => Ok(Algorithm::Ed25519),
            _ => Err(SigningError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Public half of a wallet key pair.
#[derive(Clone, PartialEq, Eq)]
pub enum PublicKey {
    Secp256k1(k256::PublicKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl PublicKey {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            PublicKey::Secp256k1(_) => Algorithm::Secp256k1,
            PublicKey::Ed25519(_) => Algorithm::Ed25519,
        }
    }

    /// Raw key bytes: uncompressed SEC1 point for secp256k1, 32 bytes for ed25519.
    pub fn to_bytes(&self) -> Vec<u8> {
        use k256::elliptic_curve::sec1::ToEncodedPoint;

        match self {
            PublicKey::Secp256k1(key) => key.to_encoded_point(false).as_bytes().to_vec(),
            PublicKey::Ed25519(key) => key.to_bytes().to_vec(),
        }
    }

    /// `0x`-prefixed hex of [`Self::to_bytes`].
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    pub fn from_hex(algorithm: Algorithm, value: &str) -> Result<Self, SigningError> {
        let raw = value.strip_prefix("0x").unwrap_or(value);
        let bytes = hex::decode(raw).map_err(|e| SigningError::Key(e.to_string()))?;
        match algorithm {
            Algorithm::Secp256k1 => k256::PublicKey::from_sec1_bytes(&bytes)
                .map(PublicKey::Secp256k1)
                .map_err(|e| SigningError::Key(e.to_string())),
            Algorithm::Ed25519 => {
                let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    SigningError::Key(format!("ed25519 public key must be 32 bytes, got {}", bytes.len()))
                })?;
                ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map(PublicKey::Ed25519)
                    .map_err(|e| SigningError::Key(e.to_string()))
            }
        }
    }

    /// SPKI PEM encoding.
    pub fn to_pem(&self) -> Result<String, SigningError> {
        match self {
            PublicKey::Secp256k1(key) => {
                use k256::pkcs8::{EncodePublicKey, LineEnding};
                key.to_public_key_pem(LineEnding::LF)
                    .map_err(|e| SigningError::Key(e.to_string()))
            }
            PublicKey::Ed25519(key) => {
                use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
                use ed25519_dalek::pkcs8::EncodePublicKey;
                key.to_public_key_pem(LineEnding::LF)
                    .map_err(|e| SigningError::Key(e.to_string()))
            }
        }
    }

    pub fn from_pem(algorithm: Algorithm, pem: &str) -> Result<Self, SigningError> {
        match algorithm {
            Algorithm::Secp256k1 => {
                use k256::pkcs8::DecodePublicKey;
                k256::PublicKey::from_public_key_pem(pem)
                    .map(PublicKey::Secp256k1)
                    .map_err(|e| SigningError::Key(e.to_string()))
            }
            Algorithm::Ed25519 => {
                use ed25519_dalek::pkcs8::DecodePublicKey;
                ed25519_dalek::VerifyingKey::from_public_key_pem(pem)
                    .map(PublicKey::Ed25519)
                    .map_err(|e| SigningError::Key(e.to_string()))
            }
        }
    }

    /// Ethereum address. ed25519 keys have none.
    pub fn address(&self) -> Option<Address> {
        match self {
            PublicKey::Secp256k1(key) => Some(address_from_public_key(key)),
            PublicKey::Ed25519(_) => None,
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey")
            .field(&self.algorithm())
            .field(&self.to_hex())
            .finish()
    }
}

/// Keccak-256 of the 64-byte uncompressed point, last 20 bytes.
pub fn address_from_public_key(key: &k256::PublicKey) -> Address {
    use k256::elliptic_curve::sec1::ToEncodedPoint;

    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// A signature whose shape is fixed by the producing algorithm.
#[derive(Clone, PartialEq, Eq)]
pub enum WalletSignature {
    /// `r(32) || s(32) || v(1)` with raw `v` in {0, 1}.
    Secp256k1([u8; 65]),
    Ed25519([u8; 64]),
}

impl WalletSignature {
    /// Validate raw bytes against the algorithm's signature shape.
    pub fn from_raw(algorithm: Algorithm, bytes: &[u8]) -> Result<Self, SigningError> {
        let length_error = || SigningError::InvalidSignatureLength {
            expected: algorithm.signature_len(),
            actual: bytes.len(),
        };
        match algorithm {
            Algorithm::Secp256k1 => bytes
                .try_into()
                .map(WalletSignature::Secp256k1)
                .map_err(|_| length_error()),
            Algorithm::Ed25519 => bytes
                .try_into()
                .map(WalletSignature::Ed25519)
                .map_err(|_| length_error()),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            WalletSignature::Secp256k1(_) => Algorithm::Secp256k1,
            WalletSignature::Ed25519(_) => Algorithm::Ed25519,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            WalletSignature::Secp256k1(bytes) => bytes,
            WalletSignature::Ed25519(bytes) => bytes,
        }
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.as_bytes()))
    }

    /// Recoverable Ethereum signature. Only secp256k1 signatures qualify.
    pub fn to_eth_signature(&self) -> Result<Signature, SigningError> {
        match self {
            WalletSignature::Secp256k1(bytes) => {
                let r = U256::from_be_slice(&bytes[..32]);
                let s = U256::from_be_slice(&bytes[32..64]);
                let parity = match bytes[64] {
                    0 | 27 => false,
                    1 | 28 => true,
                    other => return Err(SigningError::InvalidRecoveryId(other)),
                };
                Ok(Signature::new(r, s, parity))
            }
            WalletSignature::Ed25519(_) => Err(SigningError::UnsupportedAlgorithm(
                "ed25519 signatures are not recoverable".to_string(),
            )),
        }
    }
}

impl From<Signature> for WalletSignature {
    fn from(sig: Signature) -> Self {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(&sig.r().to_be_bytes::<32>());
        bytes[32..64].copy_from_slice(&sig.s().to_be_bytes::<32>());
        bytes[64] = sig.v() as u8;
        WalletSignature::Secp256k1(bytes)
    }
}

impl fmt::Debug for WalletSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WalletSignature")
            .field(&self.algorithm())
            .field(&self.to_hex())
            .finish()
    }
}
