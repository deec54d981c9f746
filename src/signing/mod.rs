//! Signing subsystem.
//!
//! # Data Flow
//! ```text
//! hash (32 bytes)
//!     → signer.rs (WalletSigner → SecretStore::sign → PrivateKey::sign)
//!     → types.rs (WalletSignature shaped by Algorithm)
//!     → typed_data.rs (EIP-712 challenge + v normalization)
//!     → message.rs (keccak256 message sign / verify)
//! ```
//!
//! # Security Constraints
//! - The production backend signs server-side; key bytes never reach this process
//! - ed25519 wallets cannot produce recoverable Ethereum signatures

pub mod message;
pub mod signer;
pub mod typed_data;
pub mod types;

pub use signer::{PrivateKey, WalletSigner};
pub use typed_data::TypedDataSigner;
pub use types::{Algorithm, PublicKey, SigningError, WalletSignature};
