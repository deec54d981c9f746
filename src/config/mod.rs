//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, env overrides)
//!     → validation.rs (semantic checks)
//!     → KmsConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! environment
//!     → env.rs (VAULT_TOKEN, WALLET_PASSWORD, PLATFORM_AUTH_TOKEN)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Credentials come only from the environment

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ChainConfig, KmsConfig, ListenerConfig, ObservabilityConfig, PlatformConfig, RelayConfig,
    SchedulerConfig, SecretBackend, SecretsConfig, VaultConfig,
};
