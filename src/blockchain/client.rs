//! Chain RPC client with timeout and failover.
//!
//! # Responsibilities
//! - Connect to the primary JSON-RPC endpoint plus failovers
//! - Query chain state (chain id, fees, balances) and simulate calls
//! - Broadcast signed raw transactions
//! - Bound every call by the configured timeout
//!
//! Reads fail over freely. A broadcast moves to the next provider only when
//! the previous one was never reached; after a timeout or a dropped
//! connection the transaction may already be in a mempool, so the call
//! fails instead of resending it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::{RpcError, TransportErrorKind, TransportResult};
use async_trait::async_trait;
use tokio::time::timeout;

use crate::blockchain::types::{BlockchainError, BlockchainResult, ChainId};
use crate::config::ChainConfig;
use crate::observability::metrics;

/// Chain operations the service depends on.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn chain_id(&self) -> BlockchainResult<ChainId>;

    /// Legacy gas price in wei.
    async fn gas_price(&self) -> BlockchainResult<u128>;

    /// Suggested EIP-1559 priority fee in wei.
    async fn max_priority_fee(&self) -> BlockchainResult<u128>;

    async fn estimate_gas(&self, tx: &TransactionRequest) -> BlockchainResult<u64>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> BlockchainResult<TxHash>;

    /// `eth_call` against the latest block.
    async fn call(&self, tx: &TransactionRequest) -> BlockchainResult<Bytes>;

    async fn balance(&self, address: Address) -> BlockchainResult<U256>;

    async fn is_healthy(&self) -> bool;
}

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// Chain RPC client wrapper with failover support.
#[derive(Clone)]
pub struct ChainClient {
    /// List of providers (primary + failovers).
    providers: Vec<DynProvider>,
    config: ChainConfig,
    timeout_duration: Duration,
}

impl ChainClient {
    /// Create a client. An unreachable node is logged, not fatal.
    pub async fn new(config: ChainConfig) -> BlockchainResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as DynProvider);

        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse::<url::Url>() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        let client = Self {
            providers,
            config: config.clone(),
            timeout_duration,
        };

        match client.chain_id().await {
            Ok(chain_id) => {
                tracing::info!(rpc_url = %config.rpc_url, chain_id = %chain_id, "Chain client initialized")
            }
            Err(e) => tracing::warn!(
                error = %e,
                "Chain client initialized but chain verification failed"
            ),
        }

        Ok(client)
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Run `op` against each provider in turn until one answers.
    ///
    /// A JSON-RPC error response is the node's verdict and is returned
    /// without trying the next provider.
    async fn failover<T, F, Fut>(&self, label: &'static str, op: F) -> BlockchainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, op(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(RpcError::ErrorResp(payload))) => {
                    return Err(BlockchainError::Rejected(payload.message.to_string()))
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, call = label, error = %e, "RPC error, trying next provider")
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, call = label, "RPC timeout, trying next provider")
                }
            }
        }
        Err(BlockchainError::Rpc(format!(
            "All RPC providers failed ({})",
            label
        )))
    }
}

#[async_trait]
impl ChainRpc for ChainClient {
    async fn chain_id(&self) -> BlockchainResult<ChainId> {
        let actual = self
            .failover("eth_chainId", |p| async move { p.get_chain_id().await })
            .await?;
        match self.config.chain_id {
            Some(expected) if expected != actual => {
                Err(BlockchainError::ChainMismatch { expected, actual })
            }
            _ => Ok(ChainId(actual)),
        }
    }

    async fn gas_price(&self) -> BlockchainResult<u128> {
        self.failover("eth_gasPrice", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn max_priority_fee(&self) -> BlockchainResult<u128> {
        self.failover("eth_maxPriorityFeePerGas", |p| async move {
            p.get_max_priority_fee_per_gas().await
        })
        .await
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> BlockchainResult<u64> {
        self.failover("eth_estimateGas", |p| {
            let tx = tx.clone();
            async move { p.estimate_gas(tx).await }
        })
        .await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> BlockchainResult<TxHash> {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, provider.send_raw_transaction(raw)).await {
                Ok(Ok(pending)) => return Ok(*pending.tx_hash()),
                Ok(Err(RpcError::ErrorResp(payload))) if is_already_known(&payload.message) => {
                    let tx_hash = keccak256(raw);
                    tracing::info!(provider_idx = i, tx_hash = %tx_hash, "Node already holds transaction");
                    return Ok(tx_hash);
                }
                Ok(Err(RpcError::ErrorResp(payload))) => {
                    return Err(BlockchainError::Rejected(payload.message.to_string()))
                }
                Ok(Err(e)) if never_reached_node(&e) => {
                    tracing::warn!(provider_idx = i, error = %e, "RPC unreachable, broadcasting via next provider")
                }
                Ok(Err(e)) => {
                    return Err(BlockchainError::Rpc(format!("broadcast outcome unknown: {}", e)))
                }
                Err(_) => return Err(BlockchainError::Timeout(self.config.rpc_timeout_secs)),
            }
        }
        Err(BlockchainError::Rpc(
            "All RPC providers failed (eth_sendRawTransaction)".into(),
        ))
    }

    async fn call(&self, tx: &TransactionRequest) -> BlockchainResult<Bytes> {
        self.failover("eth_call", |p| {
            let tx = tx.clone();
            async move { p.call(tx).await }
        })
        .await
    }

    async fn balance(&self, address: Address) -> BlockchainResult<U256> {
        self.failover("eth_getBalance", |p| async move { p.get_balance(address).await })
            .await
    }

    async fn is_healthy(&self) -> bool {
        let healthy = self
            .failover("eth_blockNumber", |p| async move { p.get_block_number().await })
            .await
            .is_ok();
        metrics::record_upstream_health("chain_rpc", healthy);
        healthy
    }
}

/// Node replies meaning the exact transaction is already in its pool.
fn is_already_known(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("already known")
        || message.contains("known transaction")
        || message.contains("already imported")
}

/// True when the request failed to connect, so no node saw it.
fn never_reached_node(error: &RpcError<TransportErrorKind>) -> bool {
    match error {
        RpcError::Transport(TransportErrorKind::Custom(inner)) => inner
            .downcast_ref::<reqwest::Error>()
            .is_some_and(reqwest::Error::is_connect),
        _ => false,
    }
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("failovers", &self.config.failover_urls.len())
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}
