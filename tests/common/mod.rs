//! Shared fakes and wiring for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::consensus::TxEnvelope;
use alloy::dyn_abi::TypedData;
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{json, Value};
use uuid::Uuid;

use wallet_kms::blockchain::{BlockchainError, BlockchainResult, ChainId, ChainRpc};
use wallet_kms::lifecycle::Services;
use wallet_kms::platform::{
    AddWalletRequest, FailureReport, NonceUpdate, PlatformError, PlatformGateway, PlatformResult,
    RawRecord,
};
use wallet_kms::relay::{PayloadRequest, RelayError, RelayPayload, RelayResult, Relayer, SendRequest};
use wallet_kms::secrets::cipher::KeyCipher;
use wallet_kms::secrets::LocalSecretStore;
use wallet_kms::store::MemoryStore;

pub const CHAIN_ID: u64 = 1337;

/// In-memory chain node. Records every raw transaction it is handed.
pub struct MockChain {
    pub chain_id: u64,
    pub gas_price: u128,
    pub priority_fee: Mutex<Option<u128>>,
    pub estimate: u64,
    pub call_output: Mutex<Bytes>,
    pub balance: U256,
    pub healthy: AtomicBool,
    pub fail_broadcast: AtomicBool,
    pub raw_txs: Mutex<Vec<Vec<u8>>>,
    pub estimates: Mutex<Vec<TransactionRequest>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            chain_id: CHAIN_ID,
            gas_price: 2_000_000_000,
            priority_fee: Mutex::new(Some(1_000_000_000)),
            estimate: 21_000,
            call_output: Mutex::new(Bytes::new()),
            balance: U256::from(5_000_000_000_000_000_000u128),
            healthy: AtomicBool::new(true),
            fail_broadcast: AtomicBool::new(false),
            raw_txs: Mutex::new(Vec::new()),
            estimates: Mutex::new(Vec::new()),
        }
    }

    /// Decode every broadcast envelope.
    pub fn envelopes(&self) -> Vec<TxEnvelope> {
        self.raw_txs
            .lock()
            .unwrap()
            .iter()
            .map(|raw| TxEnvelope::decode_2718(&mut raw.as_slice()).unwrap())
            .collect()
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn chain_id(&self) -> BlockchainResult<ChainId> {
        Ok(ChainId(self.chain_id))
    }

    async fn gas_price(&self) -> BlockchainResult<u128> {
        Ok(self.gas_price)
    }

    async fn max_priority_fee(&self) -> BlockchainResult<u128> {
        self.priority_fee
            .lock()
            .unwrap()
            .ok_or_else(|| BlockchainError::Rpc("eth_maxPriorityFeePerGas unsupported".into()))
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> BlockchainResult<u64> {
        self.estimates.lock().unwrap().push(tx.clone());
        Ok(self.estimate)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> BlockchainResult<TxHash> {
        if self.fail_broadcast.load(Ordering::SeqCst) {
            return Err(BlockchainError::Rejected("nonce too low".into()));
        }
        self.raw_txs.lock().unwrap().push(raw.to_vec());
        Ok(keccak256(raw))
    }

    async fn call(&self, _tx: &TransactionRequest) -> BlockchainResult<Bytes> {
        Ok(self.call_output.lock().unwrap().clone())
    }

    async fn balance(&self, _address: Address) -> BlockchainResult<U256> {
        Ok(self.balance)
    }

    async fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

/// In-memory platform. Hands out nonces from a counter that only advances
/// on `update_nonce`. Queues hold raw JSON records, as the platform sends them.
#[derive(Default)]
pub struct MockPlatform {
    pub next_nonce: AtomicU64,
    pub fail_add_wallet: AtomicBool,
    pub fail_update_nonce: AtomicBool,
    pub fail_fetch: AtomicBool,
    /// Milliseconds `update_nonce` sleeps before answering.
    pub ack_delay_ms: AtomicU64,
    pub added: Mutex<Vec<AddWalletRequest>>,
    pub updates: Mutex<Vec<NonceUpdate>>,
    pub failures: Mutex<Vec<FailureReport>>,
    pub deploys: Mutex<VecDeque<Value>>,
    pub transactions: Mutex<VecDeque<Value>>,
    pub approvals: Mutex<VecDeque<Value>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn added_count(&self) -> usize {
        self.added.lock().unwrap().len()
    }
}

#[async_trait]
impl PlatformGateway for MockPlatform {
    async fn add_wallet(&self, request: &AddWalletRequest) -> PlatformResult<()> {
        if self.fail_add_wallet.load(Ordering::SeqCst) {
            return Err(PlatformError::Failure("platform unavailable".into()));
        }
        self.added.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn get_nonce(&self, _wallet_id: Uuid, _chain_id: u64) -> PlatformResult<u64> {
        Ok(self.next_nonce.load(Ordering::SeqCst))
    }

    async fn update_nonce(&self, update: &NonceUpdate) -> PlatformResult<()> {
        let delay = self.ack_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_update_nonce.load(Ordering::SeqCst) {
            return Err(PlatformError::Failure("nonce service down".into()));
        }
        self.next_nonce.fetch_add(1, Ordering::SeqCst);
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }

    async fn report_failure(&self, report: &FailureReport) -> PlatformResult<()> {
        self.failures.lock().unwrap().push(report.clone());
        Ok(())
    }

    async fn fetch_pending_deploys(&self) -> PlatformResult<Vec<RawRecord>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(PlatformError::InvalidResponse("deploy queue unavailable".into()));
        }
        Ok(self.deploys.lock().unwrap().drain(..).collect())
    }

    async fn fetch_pending_transactions(&self) -> PlatformResult<Vec<RawRecord>> {
        Ok(self.transactions.lock().unwrap().drain(..).collect())
    }

    async fn fetch_pending_wallet_approvals(&self) -> PlatformResult<Vec<RawRecord>> {
        Ok(self.approvals.lock().unwrap().drain(..).collect())
    }
}

/// Relayer that serves a fixed typed-data document and records submissions.
pub struct MockRelayer {
    pub payloads: Mutex<Vec<PayloadRequest>>,
    pub sent: Mutex<Vec<SendRequest>>,
    pub reject: AtomicBool,
}

impl MockRelayer {
    pub fn new() -> Self {
        Self {
            payloads: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            reject: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Relayer for MockRelayer {
    async fn payload(&self, request: &PayloadRequest) -> RelayResult<RelayPayload> {
        self.payloads.lock().unwrap().push(request.clone());
        let typed_data: TypedData = serde_json::from_value(forward_request_typed_data(
            &request.user_address,
            &request.contract_address,
        ))
        .map_err(|e| RelayError::InvalidResponse(e.to_string()))?;
        Ok(RelayPayload {
            typed_data,
            request: json!({
                "from": request.user_address,
                "to": request.contract_address,
                "nonce": "0",
            }),
        })
    }

    async fn send(&self, request: &SendRequest) -> RelayResult<String> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(RelayError::Rejected("dApp has no gas tank".into()));
        }
        self.sent.lock().unwrap().push(request.clone());
        Ok(format!("0x{}", "ab".repeat(32)))
    }
}

/// EIP-712 document shaped like a minimal-forwarder request.
pub fn forward_request_typed_data(from: &str, to: &str) -> Value {
    json!({
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "version", "type": "string" },
                { "name": "chainId", "type": "uint256" },
                { "name": "verifyingContract", "type": "address" }
            ],
            "ForwardRequest": [
                { "name": "from", "type": "address" },
                { "name": "to", "type": "address" },
                { "name": "nonce", "type": "uint256" }
            ]
        },
        "primaryType": "ForwardRequest",
        "domain": {
            "name": "MinimalForwarder",
            "version": "0.0.1",
            "chainId": CHAIN_ID,
            "verifyingContract": "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        },
        "message": { "from": from, "to": to, "nonce": "0" }
    })
}

/// The full service graph over in-memory collaborators.
pub struct Harness {
    pub services: Services,
    pub chain: Arc<MockChain>,
    pub platform: Arc<MockPlatform>,
    pub relayer: Arc<MockRelayer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(MockChain::new(), true)
    }

    pub fn without_relay() -> Self {
        Self::build(MockChain::new(), false)
    }

    pub fn build(chain: MockChain, with_relay: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        // Cheap Argon2 parameters keep tests fast.
        let cipher = KeyCipher::new(SecretString::from("test-password"), 8, 1, 1).unwrap();
        let secrets = Arc::new(LocalSecretStore::new(store.clone(), cipher, true).unwrap());
        let chain = Arc::new(chain);
        let platform = Arc::new(MockPlatform::new());
        let relayer = Arc::new(MockRelayer::new());
        let relay: Option<Arc<dyn Relayer>> = if with_relay {
            Some(relayer.clone())
        } else {
            None
        };

        let services = Services::assemble(store, secrets, platform.clone(), chain.clone(), relay);
        Self {
            services,
            chain,
            platform,
            relayer,
        }
    }
}

/// `SimpleStorage` with `store(uint256)` and `retrieve() returns (uint256)`.
pub const STORAGE_ABI: &str = r#"[
    {"type":"constructor","inputs":[{"name":"initial","type":"uint256"}],"stateMutability":"nonpayable"},
    {"type":"function","name":"store","inputs":[{"name":"num","type":"uint256"}],"outputs":[],"stateMutability":"nonpayable"},
    {"type":"function","name":"retrieve","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"}
]"#;

pub const STORAGE_BYTECODE: &str = "0x6080604052348015600f57600080fd5b50";
