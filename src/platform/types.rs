//! Wire types exchanged with the platform.

use alloy::primitives::U256;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::blockchain::abi::AbiParam;
use crate::signing::Algorithm;

/// Response envelope used by the platform (and by this service's own API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

pub const STATUS_SUCCESS: &str = "SUCCESS";
pub const STATUS_FAILURE: &str = "FAILURE";

/// Registration notice for a newly created wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddWalletRequest {
    pub wallet_id: Uuid,
    pub address: String,
    pub name: String,
    pub algorithm: Algorithm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
}

/// Query for the next nonce of a wallet on a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceQuery {
    pub wallet_id: Uuid,
    pub chain_id: String,
}

/// Kind of broadcast being acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Txn,
    Deploy,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Txn => "txn",
            OperationKind::Deploy => "deploy",
        }
    }
}

/// Outcome report after a successful broadcast; advances the platform nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceUpdate {
    pub wallet_id: Uuid,
    pub chain_id: String,
    pub reference_id: String,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub txn_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
}

/// Class of a pending platform record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordClass {
    Deploy,
    Transaction,
    Wallet,
}

impl RecordClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordClass::Deploy => "deploy",
            RecordClass::Transaction => "transaction",
            RecordClass::Wallet => "wallet",
        }
    }

    /// Field carrying the platform reference of a record of this class.
    pub fn reference_field(&self) -> &'static str {
        match self {
            RecordClass::Deploy | RecordClass::Transaction => "referenceId",
            RecordClass::Wallet => "uniqueId",
        }
    }
}

/// A pending record as fetched, before it is parsed into its typed form.
/// Batches are parsed record by record so one malformed entry only fails
/// itself.
pub type RawRecord = serde_json::Value;

/// Reference of a raw record, when it carries a usable one.
pub fn raw_reference(record: &RawRecord, class: RecordClass) -> Option<String> {
    match record.get(class.reference_field())? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Failure notice for a pending record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub reference_id: String,
    #[serde(rename = "type")]
    pub class: RecordClass,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NonceData {
    pub nonce: u64,
}

/// Pending contract deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDeploy {
    pub reference_id: String,
    #[serde(default)]
    pub subscription_id: Option<String>,
    pub wallet_id: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    pub byte_code: String,
    /// JSON ABI, plain or base64-encoded.
    pub abi: String,
    #[serde(default)]
    pub params: Vec<AbiParam>,
    #[serde(default, deserialize_with = "deserialize_u64")]
    pub gas: u64,
}

/// Pending transaction (value transfer or contract call).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    pub reference_id: String,
    #[serde(default)]
    pub subscription_id: Option<String>,
    pub wallet_id: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "deserialize_u64")]
    pub gas: u64,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub value: U256,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Vec<AbiParam>,
    #[serde(default)]
    pub is_contract_txn: bool,
    #[serde(default, rename = "contractABI")]
    pub contract_abi: Option<String>,
    /// Calldata, base64 or `0x`-hex.
    #[serde(default)]
    pub data: Option<String>,
}

/// Pending wallet creation approved on the platform.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWalletApproval {
    pub unique_id: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    pub wallet_name: String,
    pub algorithm: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Number(serde_json::Number),
    Text(String),
}

/// JSON numbers above `u64::MAX` arrive as lossy floats and are refused.
fn exact_u64(n: &serde_json::Number) -> Result<u64, String> {
    n.as_u64().ok_or_else(|| {
        format!(
            "{} is not an unsigned 64-bit integer; send larger values as decimal strings",
            n
        )
    })
}

/// Accept an amount as a JSON number or a decimal/`0x`-hex string.
pub fn deserialize_amount<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawAmount>::deserialize(deserializer)? {
        None => Ok(U256::ZERO),
        Some(RawAmount::Number(n)) => exact_u64(&n)
            .map(U256::from)
            .map_err(|e| serde::de::Error::custom(format!("invalid amount: {}", e))),
        Some(RawAmount::Text(s)) if s.trim().is_empty() => Ok(U256::ZERO),
        Some(RawAmount::Text(s)) => s
            .trim()
            .parse::<U256>()
            .map_err(|e| serde::de::Error::custom(format!("invalid amount '{}': {}", s, e))),
    }
}

/// Accept an optional integer (chain ids, gas) as a number or a string.
pub fn deserialize_optional_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawAmount>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawAmount::Number(n)) => exact_u64(&n)
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid integer: {}", e))),
        Some(RawAmount::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(RawAmount::Text(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid integer '{}': {}", s, e))),
    }
}

/// Like [`deserialize_optional_u64`], with absent values read as zero.
pub fn deserialize_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_optional_u64(deserializer)?.unwrap_or(0))
}
