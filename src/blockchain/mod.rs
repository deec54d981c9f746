//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! TransactionIntent / DeployIntent
//!     → abi.rs (ABI parse, param coercion, calldata)
//!     → transaction.rs (nonce from platform under nonce.rs lock,
//!                       build envelope, sign via WalletSigner)
//!     → client.rs (broadcast over failover RPC providers)
//!     → platform nonce acknowledgement
//! ```
//!
//! # Security Constraints
//! - Keys never enter this module; signing is delegated to the secret backend
//! - All RPC calls have configurable timeouts
//! - Nonces are never cached or incremented locally

pub mod abi;
pub mod client;
pub mod nonce;
pub mod transaction;
pub mod types;

pub use client::{ChainClient, ChainRpc};
pub use nonce::{NonceGuard, NonceLocks};
pub use transaction::{
    CallIntent, DeployIntent, EstimateIntent, GasEstimate, Submission, TransactionBuilder,
    TransactionIntent,
};
pub use types::{BlockchainError, BlockchainResult, ChainId};
