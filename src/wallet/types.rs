//! Wallet records.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{KmsError, KmsResult};
use crate::signing::Algorithm;

/// Public attributes of a custodial wallet. Never holds private material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub wallet_id: Uuid,
    /// Also the secret backend key for this wallet's key pair.
    pub name: String,
    pub algorithm: Algorithm,
    /// Ethereum address; `None` for ed25519 wallets.
    pub address: Option<Address>,
    /// `0x`-hex public key (uncompressed SEC1 or raw ed25519).
    pub public_key: String,
    /// Unix seconds.
    pub created_at: u64,
}

impl Wallet {
    /// Address for an Ethereum operation, or `UnsupportedForAlgorithm`.
    pub fn eth_address(&self, operation: &'static str) -> KmsResult<Address> {
        match (self.algorithm, self.address) {
            (Algorithm::Secp256k1, Some(address)) => Ok(address),
            _ => Err(KmsError::UnsupportedForAlgorithm {
                operation,
                algorithm: self.algorithm,
            }),
        }
    }

    /// Address as sent to the platform: checksummed hex, or the public key
    /// for wallets without an Ethereum address.
    pub fn platform_address(&self) -> String {
        match self.address {
            Some(address) => address.to_checksum(None),
            None => self.public_key.clone(),
        }
    }
}

/// Parse a wallet id supplied by a caller or the platform.
pub fn parse_wallet_id(raw: &str) -> KmsResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|e| KmsError::Validation(format!("Invalid wallet id '{}': {}", raw, e)))
}

/// Marker for a wallet the platform has not acknowledged yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSync {
    /// Approval reference to echo back, if the wallet came from one.
    pub reference_id: Option<String>,
}

/// Outcome of one pending-sync repair pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub repaired: usize,
    pub still_pending: usize,
}
