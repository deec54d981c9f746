//! Gasless (meta-transaction) submission through an external relayer.
//!
//! # Data Flow
//! ```text
//! GaslessRequest
//!     → WalletRegistry::authorize (secp256k1 only)
//!     → Relayer::payload   (relayer builds the forward request + EIP-712 typed data)
//!     → TypedDataSigner    (wallet signs the typed data)
//!     → Relayer::send      (relayer pays gas and broadcasts)
//!     → tx hash
//! ```

mod client;

pub use client::RelayClient;

use std::sync::Arc;

use alloy::dyn_abi::TypedData;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::blockchain::abi::AbiParam;
use crate::error::{KmsError, KmsResult};
use crate::platform::types::{deserialize_amount, deserialize_optional_u64};
use crate::signing::TypedDataSigner;
use crate::wallet::WalletRegistry;

pub const SIGNATURE_TYPE_EIP712: &str = "EIP712_SIGN";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relayer request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("relayer rejected request: {0}")]
    Rejected(String),

    #[error("invalid relayer response: {0}")]
    InvalidResponse(String),
}

pub type RelayResult<T> = Result<T, RelayError>;

/// Inbound gasless submission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GaslessRequest {
    pub wallet_id: String,
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    pub chain_id: Option<u64>,
    #[serde(rename = "dAppId")]
    pub dapp_id: String,
    pub to: String,
    #[serde(default)]
    pub gas: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub value: alloy::primitives::U256,
    pub method: String,
    #[serde(default)]
    pub params: Vec<AbiParam>,
    #[serde(rename = "contractABI")]
    pub contract_abi: String,
}

/// Ask the relayer to prepare a forward request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadRequest {
    pub chain_id: String,
    #[serde(rename = "dAppId")]
    pub dapp_id: String,
    pub user_address: String,
    pub contract_address: String,
    pub contract_abi: String,
    pub method: String,
    pub args: Vec<Value>,
}

/// Forward request and the typed data the user must sign.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayPayload {
    pub typed_data: TypedData,
    pub request: Value,
}

/// Signed forward request handed back to the relayer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub chain_id: String,
    #[serde(rename = "dAppId")]
    pub dapp_id: String,
    pub user_address: String,
    pub contract_address: String,
    pub method: String,
    pub request: Value,
    pub signature: String,
    pub domain_separator: String,
    pub signature_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GaslessSubmission {
    pub tx_hash: String,
}

/// Meta-transaction relayer.
#[async_trait]
pub trait Relayer: Send + Sync {
    async fn payload(&self, request: &PayloadRequest) -> RelayResult<RelayPayload>;

    /// Submit a signed forward request; returns the relayed transaction hash.
    async fn send(&self, request: &SendRequest) -> RelayResult<String>;
}

/// Gasless submission front end. Inert when no relayer is configured.
pub struct GaslessRelay {
    registry: Arc<WalletRegistry>,
    relayer: Option<Arc<dyn Relayer>>,
}

impl GaslessRelay {
    pub fn new(registry: Arc<WalletRegistry>, relayer: Option<Arc<dyn Relayer>>) -> Self {
        Self { registry, relayer }
    }

    pub fn is_enabled(&self) -> bool {
        self.relayer.is_some()
    }

    pub async fn submit_gasless(&self, request: &GaslessRequest) -> KmsResult<GaslessSubmission> {
        let relayer = self
            .relayer
            .as_ref()
            .ok_or_else(|| KmsError::Validation("gasless relay is not configured".into()))?;

        let wallet = self.registry.authorize(&request.wallet_id)?;
        let user_address = wallet.eth_address("gasless_submit")?;
        let chain_id = request
            .chain_id
            .ok_or_else(|| KmsError::Validation("chainId is required".into()))?
            .to_string();

        let payload_request = PayloadRequest {
            chain_id: chain_id.clone(),
            dapp_id: request.dapp_id.clone(),
            user_address: user_address.to_checksum(None),
            contract_address: request.to.clone(),
            contract_abi: request.contract_abi.clone(),
            method: request.method.clone(),
            args: request.params.iter().map(|p| p.value.clone()).collect(),
        };
        let payload = relayer.payload(&payload_request).await?;

        let domain_separator = payload.typed_data.domain.separator();
        let signer = TypedDataSigner::new(self.registry.signer(wallet));
        let signature = signer.sign(&payload.typed_data).await?;

        let send = SendRequest {
            chain_id,
            dapp_id: request.dapp_id.clone(),
            user_address: payload_request.user_address,
            contract_address: payload_request.contract_address,
            method: payload_request.method,
            request: payload.request,
            signature,
            domain_separator: format!("{:#x}", domain_separator),
            signature_type: SIGNATURE_TYPE_EIP712.to_string(),
        };
        let tx_hash = relayer.send(&send).await?;

        tracing::info!(
            wallet_id = %request.wallet_id,
            dapp_id = %request.dapp_id,
            tx_hash = %tx_hash,
            "Gasless transaction relayed"
        );
        Ok(GaslessSubmission { tx_hash })
    }
}

impl std::fmt::Debug for GaslessRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaslessRelay")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
