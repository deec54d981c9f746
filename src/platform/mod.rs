//! Platform gateway.
//!
//! # Data Flow
//! ```text
//! wallet registry ──► add_wallet
//! tx builder ───────► get_nonce ──► (sign, broadcast) ──► update_nonce
//! scheduler ────────► fetch_pending_{deploys,transactions,wallet_approvals}
//!                     report_failure
//! ```
//!
//! # Design Decisions
//! - The platform owns the nonce counter and the pending-work queues
//! - Every call carries the shared bearer token and the instance id
//! - A `FAILURE` envelope surfaces the platform's own message

mod client;
pub mod types;

pub use client::PlatformClient;
pub use types::{
    AddWalletRequest, FailureReport, NonceUpdate, OperationKind, PendingDeploy,
    PendingTransaction, PendingWalletApproval, RawRecord, RecordClass,
};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("platform rejected request: {0}")]
    Failure(String),

    #[error("invalid platform response: {0}")]
    InvalidResponse(String),

    #[error("platform configuration error: {0}")]
    Configuration(String),
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Outbound calls to the platform.
#[async_trait]
pub trait PlatformGateway: Send + Sync {
    async fn add_wallet(&self, request: &AddWalletRequest) -> PlatformResult<()>;

    /// Next nonce to use for `wallet_id` on `chain_id`.
    async fn get_nonce(&self, wallet_id: Uuid, chain_id: u64) -> PlatformResult<u64>;

    async fn update_nonce(&self, update: &NonceUpdate) -> PlatformResult<()>;

    async fn report_failure(&self, report: &FailureReport) -> PlatformResult<()>;

    /// Queued deployments, each shaped like [`PendingDeploy`].
    async fn fetch_pending_deploys(&self) -> PlatformResult<Vec<RawRecord>>;

    /// Queued transactions, each shaped like [`PendingTransaction`].
    async fn fetch_pending_transactions(&self) -> PlatformResult<Vec<RawRecord>>;

    /// Approved wallets, each shaped like [`PendingWalletApproval`].
    async fn fetch_pending_wallet_approvals(&self) -> PlatformResult<Vec<RawRecord>>;
}
