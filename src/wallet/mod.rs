//! Wallet registry.
//!
//! # Data Flow
//! ```text
//! create_wallet / approve_wallet
//!     → SecretStore::get_secret   (name must be free)
//!     → SecretStore::generate_key (key pair stays in the backend)
//!     → KeyValueStore             (wallet, name index, pending-sync marker)
//!     → PlatformGateway::add_wallet
//!         ok  → marker cleared
//!         err → WalletNotSynced, marker kept for repair_pending_sync
//! ```

pub mod registry;
pub mod types;

pub use registry::WalletRegistry;
pub use types::{parse_wallet_id, PendingSync, RepairReport, Wallet};
