//! Transaction building, signing and submission.
//!
//! # Responsibilities
//! - Resolve the wallet and check it can sign Ethereum transactions
//! - Serialize nonce use per (wallet, chain) while the platform nonce is in flight
//! - Build legacy (transact, transfer) and EIP-1559 (deploy) envelopes
//! - Sign through the secret backend, broadcast, then acknowledge to the platform
//! - Read-only helpers: contract calls, gas estimation, balances
//!
//! No step is retried within one invocation; the platform redelivers.
//!
//! Broadcast and acknowledgement run on a spawned task that owns the nonce
//! guard. A caller that goes away mid-flight (request timeout, client
//! disconnect) cannot separate a transaction that reached the node from its
//! platform acknowledgement.

use std::sync::Arc;

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TransactionBuilder as _;
use alloy::primitives::{keccak256, Address, TxHash, TxKind, U256};
use alloy::rpc::types::TransactionRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::blockchain::abi::{self, AbiParam};
use crate::blockchain::client::ChainRpc;
use crate::blockchain::nonce::{NonceGuard, NonceLocks};
use crate::blockchain::types::{BlockchainError, ChainId};
use crate::error::{KmsError, KmsResult};
use crate::observability::metrics;
use crate::platform::types::{deserialize_amount, deserialize_optional_u64};
use crate::platform::{NonceUpdate, OperationKind, PendingDeploy, PendingTransaction, PlatformGateway};
use crate::wallet::WalletRegistry;

/// A value transfer or state-changing contract call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionIntent {
    pub wallet_id: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub value: U256,
    /// Gas limit, used when `gas_limit` is absent.
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    pub gas: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    pub gas_limit: Option<u64>,
    /// Legacy gas price in wei.
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    pub gas_price: Option<u64>,
    /// Raw calldata for transfers, base64 or `0x`-hex.
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Vec<AbiParam>,
    #[serde(default)]
    pub is_contract_txn: bool,
    #[serde(default, rename = "contractABI")]
    pub contract_abi: Option<String>,
    /// Platform reference echoed in the nonce update.
    #[serde(default)]
    pub reference_id: Option<String>,
}

impl From<PendingTransaction> for TransactionIntent {
    fn from(record: PendingTransaction) -> Self {
        Self {
            wallet_id: record.wallet_id,
            to: record.to,
            value: record.value,
            gas: (record.gas > 0).then_some(record.gas),
            gas_limit: None,
            gas_price: None,
            data: record.data,
            method: record.method,
            params: record.params,
            is_contract_txn: record.is_contract_txn,
            contract_abi: record.contract_abi,
            reference_id: Some(record.reference_id),
        }
    }
}

/// A contract deployment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployIntent {
    pub wallet_id: String,
    pub byte_code: String,
    /// JSON ABI, plain or base64.
    #[serde(default)]
    pub abi: String,
    #[serde(default)]
    pub params: Vec<AbiParam>,
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    pub gas: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub value: U256,
    #[serde(default)]
    pub reference_id: Option<String>,
}

impl From<PendingDeploy> for DeployIntent {
    fn from(record: PendingDeploy) -> Self {
        Self {
            wallet_id: record.wallet_id,
            byte_code: record.byte_code,
            abi: record.abi,
            params: record.params,
            gas: (record.gas > 0).then_some(record.gas),
            value: U256::ZERO,
            reference_id: Some(record.reference_id),
        }
    }
}

/// A read-only contract call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallIntent {
    pub wallet_id: String,
    pub to: String,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub value: U256,
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    pub gas: Option<u64>,
    pub method: String,
    #[serde(default)]
    pub params: Vec<AbiParam>,
    #[serde(rename = "contractABI")]
    pub contract_abi: String,
}

/// Gas estimation for a transfer, a contract call or a deployment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateIntent {
    pub wallet_id: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub value: U256,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Vec<AbiParam>,
    #[serde(default, rename = "contractABI")]
    pub contract_abi: Option<String>,
    #[serde(default)]
    pub byte_code: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Result of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub tx_hash: TxHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Address>,
    pub nonce: u64,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    pub address: Address,
    pub estimated_gas: u64,
}

/// Builds, signs and submits transactions for registry wallets.
pub struct TransactionBuilder {
    registry: Arc<WalletRegistry>,
    chain: Arc<dyn ChainRpc>,
    platform: Arc<dyn PlatformGateway>,
    locks: NonceLocks,
}

impl TransactionBuilder {
    pub fn new(
        registry: Arc<WalletRegistry>,
        chain: Arc<dyn ChainRpc>,
        platform: Arc<dyn PlatformGateway>,
    ) -> Self {
        Self {
            registry,
            chain,
            platform,
            locks: NonceLocks::new(),
        }
    }

    pub fn chain(&self) -> &Arc<dyn ChainRpc> {
        &self.chain
    }

    /// Sign and broadcast a transfer or contract transaction.
    pub async fn submit(&self, intent: &TransactionIntent) -> KmsResult<Submission> {
        let signer = self.registry.signer(self.registry.authorize(&intent.wallet_id)?);
        let from = signer.eth_address("sign_transaction")?;

        let (to, input) = if intent.is_contract_txn {
            let abi_json = non_empty(intent.contract_abi.as_deref())
                .ok_or_else(|| KmsError::Validation("contractABI is required for contract transactions".into()))?;
            let method = non_empty(intent.method.as_deref())
                .ok_or_else(|| KmsError::Validation("method is required for contract transactions".into()))?;
            let to = required_address("to", intent.to.as_deref())?;
            let contract = abi::parse_abi(abi_json)?;
            let (_, data) = abi::encode_call(&contract, method, &intent.params)?;
            (to, data)
        } else {
            let to = required_address("to", intent.to.as_deref())?;
            let data = match non_empty(intent.data.as_deref()) {
                Some(raw) => abi::decode_binary("data", raw)?,
                None => Vec::new(),
            };
            (to, data)
        };

        let chain_id = self.chain.chain_id().await?;
        let guard = self.locks.acquire(signer.wallet().wallet_id, chain_id).await;
        let nonce = self.platform.get_nonce(signer.wallet().wallet_id, chain_id.0).await?;

        let gas_price = match intent.gas_price {
            Some(price) => u128::from(price),
            None => self.chain.gas_price().await?,
        };
        let gas_limit = match intent.gas_limit.or(intent.gas).filter(|g| *g > 0) {
            Some(limit) => limit,
            None => {
                let request = TransactionRequest::default()
                    .with_from(from)
                    .with_to(to)
                    .with_value(intent.value)
                    .with_gas_price(gas_price)
                    .with_input(input.clone());
                self.chain.estimate_gas(&request).await?
            }
        };

        let tx = TxLegacy {
            chain_id: Some(chain_id.0),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(to),
            value: intent.value,
            input: input.into(),
        };
        let signature = signer
            .sign_ethereum(tx.signature_hash(), "sign_transaction")
            .await?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));

        let tx_hash = self
            .broadcast_and_acknowledge(
                guard,
                envelope,
                PendingAck {
                    wallet_id: signer.wallet().wallet_id,
                    chain_id,
                    nonce,
                    kind: OperationKind::Txn,
                    contract_address: None,
                    reference_id: intent.reference_id.clone(),
                },
            )
            .await?;

        Ok(Submission {
            tx_hash,
            contract_address: None,
            nonce,
            chain_id: chain_id.0,
        })
    }

    /// Sign and broadcast a contract deployment.
    pub async fn deploy(&self, intent: &DeployIntent) -> KmsResult<Submission> {
        let signer = self.registry.signer(self.registry.authorize(&intent.wallet_id)?);
        let from = signer.eth_address("deploy_contract")?;

        let contract = abi::parse_abi(&intent.abi)?;
        let code = abi::encode_deploy(&contract, &intent.byte_code, &intent.params)?;

        let chain_id = self.chain.chain_id().await?;
        let guard = self.locks.acquire(signer.wallet().wallet_id, chain_id).await;
        let nonce = self.platform.get_nonce(signer.wallet().wallet_id, chain_id.0).await?;

        let priority_fee = self.chain.max_priority_fee().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Priority fee unavailable, using zero");
            0
        });
        let fee_cap = self.chain.gas_price().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Gas price unavailable, using zero");
            0
        });

        let gas_limit = match intent.gas.filter(|g| *g > 0) {
            Some(limit) => limit,
            None => {
                let request = TransactionRequest::default()
                    .with_from(from)
                    .with_value(intent.value)
                    .with_deploy_code(code.clone());
                self.chain.estimate_gas(&request).await?
            }
        };

        let tx = TxEip1559 {
            chain_id: chain_id.0,
            nonce,
            gas_limit,
            max_fee_per_gas: fee_cap.max(priority_fee),
            max_priority_fee_per_gas: priority_fee,
            to: TxKind::Create,
            value: intent.value,
            input: code.into(),
            ..Default::default()
        };
        let signature = signer
            .sign_ethereum(tx.signature_hash(), "deploy_contract")
            .await?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));
        let contract_address = from.create(nonce);

        let tx_hash = self
            .broadcast_and_acknowledge(
                guard,
                envelope,
                PendingAck {
                    wallet_id: signer.wallet().wallet_id,
                    chain_id,
                    nonce,
                    kind: OperationKind::Deploy,
                    contract_address: Some(contract_address),
                    reference_id: intent.reference_id.clone(),
                },
            )
            .await?;

        Ok(Submission {
            tx_hash,
            contract_address: Some(contract_address),
            nonce,
            chain_id: chain_id.0,
        })
    }

    /// `eth_call` a view method and decode its outputs.
    pub async fn call_contract(&self, intent: &CallIntent) -> KmsResult<Value> {
        let wallet = self.registry.authorize(&intent.wallet_id)?;
        let to = required_address("to", Some(&intent.to))?;
        let contract = abi::parse_abi(&intent.contract_abi)?;
        let (function, data) = abi::encode_call(&contract, &intent.method, &intent.params)?;

        let mut request = TransactionRequest::default()
            .with_to(to)
            .with_value(intent.value)
            .with_input(data);
        if let Some(from) = wallet.address {
            request = request.with_from(from);
        }
        if let Some(gas) = intent.gas.filter(|g| *g > 0) {
            request = request.with_gas_limit(gas);
        }

        let output = self.chain.call(&request).await?;
        Ok(abi::decode_output(&function, &output)?)
    }

    /// Estimate gas for a deployment (`byte_code`), a contract call
    /// (`method` + `contract_abi`) or a plain transfer.
    pub async fn estimate_gas(&self, intent: &EstimateIntent) -> KmsResult<GasEstimate> {
        let wallet = self.registry.authorize(&intent.wallet_id)?;
        let from = wallet.eth_address("estimate_gas")?;

        let request = TransactionRequest::default()
            .with_from(from)
            .with_value(intent.value);
        let request = if let Some(byte_code) = non_empty(intent.byte_code.as_deref()) {
            let code = match non_empty(intent.contract_abi.as_deref()) {
                Some(raw) => abi::encode_deploy(&abi::parse_abi(raw)?, byte_code, &intent.params)?,
                None => abi::decode_bytecode(byte_code)?,
            };
            request.with_deploy_code(code)
        } else if let Some(method) = non_empty(intent.method.as_deref()) {
            let abi_json = non_empty(intent.contract_abi.as_deref())
                .ok_or_else(|| KmsError::Validation("contractABI is required when method is set".into()))?;
            let (_, data) = abi::encode_call(&abi::parse_abi(abi_json)?, method, &intent.params)?;
            request
                .with_to(required_address("to", intent.to.as_deref())?)
                .with_input(data)
        } else {
            let data = match non_empty(intent.data.as_deref()) {
                Some(raw) => abi::decode_binary("data", raw)?,
                None => Vec::new(),
            };
            request
                .with_to(required_address("to", intent.to.as_deref())?)
                .with_input(data)
        };

        let estimated_gas = self.chain.estimate_gas(&request).await?;
        Ok(GasEstimate {
            address: from,
            estimated_gas,
        })
    }

    /// Native balance of `address`. A supplied chain id must match the node.
    pub async fn balance(&self, address: Address, expected_chain: Option<u64>) -> KmsResult<U256> {
        if let Some(expected) = expected_chain {
            let actual = self.chain.chain_id().await?;
            if actual.0 != expected {
                return Err(KmsError::Validation(format!(
                    "chain id {} is not served here (connected to {})",
                    expected, actual
                )));
            }
        }
        Ok(self.chain.balance(address).await?)
    }

    /// Broadcast `envelope`, then advance the platform nonce, on a task the
    /// caller cannot cancel. The nonce guard is released when the task ends.
    async fn broadcast_and_acknowledge(
        &self,
        guard: NonceGuard,
        envelope: TxEnvelope,
        ack: PendingAck,
    ) -> KmsResult<TxHash> {
        let chain = self.chain.clone();
        let platform = self.platform.clone();
        let raw = envelope.encoded_2718();

        let task = tokio::spawn(async move {
            let _guard = guard;
            let tx_hash = match chain.send_raw_transaction(&raw).await {
                Ok(tx_hash) => tx_hash,
                Err(e @ BlockchainError::Rejected(_)) => return Err(KmsError::Chain(e)),
                Err(e) => {
                    tracing::error!(
                        wallet_id = %ack.wallet_id,
                        chain_id = %ack.chain_id,
                        nonce = ack.nonce,
                        tx_hash = %keccak256(&raw),
                        error = %e,
                        "Broadcast outcome unknown, transaction may still be pending"
                    );
                    return Err(KmsError::Chain(e));
                }
            };

            metrics::record_submission(ack.kind.as_str());
            tracing::info!(
                wallet_id = %ack.wallet_id,
                chain_id = %ack.chain_id,
                nonce = ack.nonce,
                tx_hash = %tx_hash,
                kind = ack.kind.as_str(),
                "Transaction broadcast"
            );

            acknowledge(platform.as_ref(), &ack, tx_hash)
                .await
                .map(|()| tx_hash)
        });

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(KmsError::Chain(BlockchainError::Rpc(
                "broadcast task cancelled by runtime shutdown".into(),
            ))),
        }
    }
}

/// What the platform must hear about once a transaction is broadcast.
#[derive(Debug)]
struct PendingAck {
    wallet_id: Uuid,
    chain_id: ChainId,
    nonce: u64,
    kind: OperationKind,
    contract_address: Option<Address>,
    reference_id: Option<String>,
}

async fn acknowledge(
    platform: &dyn PlatformGateway,
    ack: &PendingAck,
    tx_hash: TxHash,
) -> KmsResult<()> {
    let update = NonceUpdate {
        wallet_id: ack.wallet_id,
        chain_id: ack.chain_id.to_string(),
        reference_id: ack.reference_id.clone().unwrap_or_default(),
        kind: ack.kind,
        txn_hash: format!("{:#x}", tx_hash),
        contract_address: ack.contract_address.map(|a| a.to_checksum(None)),
    };

    platform.update_nonce(&update).await.map_err(|source| {
        tracing::error!(
            wallet_id = %update.wallet_id,
            tx_hash = %tx_hash,
            error = %source,
            "Broadcast succeeded but nonce acknowledgement failed"
        );
        KmsError::AcknowledgeFailed { tx_hash, source }
    })
}

impl std::fmt::Debug for TransactionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionBuilder")
            .field("active_nonce_locks", &self.locks.len())
            .finish()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parse a required `0x` address field.
pub fn required_address(field: &str, raw: Option<&str>) -> KmsResult<Address> {
    let raw = non_empty(raw).ok_or_else(|| KmsError::Validation(format!("{} is required", field)))?;
    raw.parse::<Address>()
        .map_err(|e| KmsError::Validation(format!("{} '{}' is not an address: {}", field, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_from_pending_record() {
        let record: PendingTransaction = serde_json::from_value(serde_json::json!({
            "referenceId": "ref-9",
            "walletId": "w",
            "to": "0x000000000000000000000000000000000000dead",
            "gas": 0,
            "value": 3
        }))
        .unwrap();
        let intent = TransactionIntent::from(record);
        assert_eq!(intent.gas, None);
        assert_eq!(intent.value, U256::from(3));
        assert_eq!(intent.reference_id.as_deref(), Some("ref-9"));
    }

    #[test]
    fn test_http_body_shape() {
        let intent: TransactionIntent = serde_json::from_str(
            r#"{"walletId":"w","to":"0x01","gasLimit":50000,"gasPrice":"7","value":"10","contractABI":"[]","isContractTxn":true}"#,
        )
        .unwrap();
        assert_eq!(intent.gas_limit, Some(50_000));
        assert_eq!(intent.gas_price, Some(7));
        assert_eq!(intent.gas, None);
        assert!(intent.is_contract_txn);
        assert_eq!(intent.contract_abi.as_deref(), Some("[]"));
    }

    #[test]
    fn test_required_address() {
        assert!(matches!(required_address("to", None), Err(KmsError::Validation(_))));
        assert!(matches!(required_address("to", Some("  ")), Err(KmsError::Validation(_))));
        assert!(matches!(required_address("to", Some("0x12")), Err(KmsError::Validation(_))));
        assert_eq!(
            required_address("to", Some("0x000000000000000000000000000000000000dEaD")).unwrap(),
            Address::from_slice(&hex::decode("000000000000000000000000000000000000dead").unwrap())
        );
    }

    #[test]
    fn test_submission_serializes_camel_case() {
        let submission = Submission {
            tx_hash: TxHash::ZERO,
            contract_address: None,
            nonce: 4,
            chain_id: 1,
        };
        let json = serde_json::to_value(&submission).unwrap();
        assert!(json.get("txHash").is_some());
        assert!(json.get("contractAddress").is_none());
    }
}
