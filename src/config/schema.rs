//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.
//! Credentials are never part of the file; see [`crate::config::env`].

use serde::{Deserialize, Serialize};

/// Root configuration for the key-management service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct KmsConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Wallet store location.
    pub store: StoreConfig,

    /// Secret backend selection and settings.
    pub secrets: SecretsConfig,

    /// Chain RPC settings.
    pub chain: ChainConfig,

    /// Platform gateway settings.
    pub platform: PlatformConfig,

    /// Gasless relayer settings.
    pub relay: RelayConfig,

    /// Background scheduler settings.
    pub scheduler: SchedulerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Grace period for in-flight work on shutdown, in seconds.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 60,
            shutdown_secs: 30,
        }
    }
}

/// Embedded store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the redb database file.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "data/wallet-kms.redb".to_string(),
        }
    }
}

/// Which secret backend holds private keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretBackend {
    Vault,
    Local,
}

/// Secret backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Backend selection.
    pub backend: SecretBackend,

    /// Must be true for the local backend to start.
    pub allow_insecure_local: bool,

    /// Remote vault settings.
    pub vault: VaultConfig,

    /// Local backend key-derivation settings.
    pub local: LocalSecretsConfig,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            backend: SecretBackend::Vault,
            allow_insecure_local: false,
            vault: VaultConfig::default(),
            local: LocalSecretsConfig::default(),
        }
    }
}

/// Vault-compatible backend settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Base address (e.g., "http://127.0.0.1:8200").
    pub address: String,

    /// KV v2 mount.
    pub kv_mount: String,

    /// Path prefix for wallet records inside the KV mount.
    pub service_prefix: String,

    /// Transit engine mount.
    pub transit_mount: String,

    /// Transit key type used for secp256k1 wallets.
    pub secp256k1_key_type: String,

    /// Transit key type used for ed25519 wallets.
    pub ed25519_key_type: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            kv_mount: "secret".to_string(),
            service_prefix: "NC-WALLET".to_string(),
            transit_mount: "transit".to_string(),
            secp256k1_key_type: "ecdsa-secp256k1".to_string(),
            ed25519_key_type: "ed25519".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Argon2id cost parameters for the local backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LocalSecretsConfig {
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

impl Default for LocalSecretsConfig {
    fn default() -> Self {
        Self {
            argon2_memory_kib: 19 * 1024,
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

/// Chain RPC configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Expected chain id. Checked at startup when set.
    pub chain_id: Option<u64>,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: None,
            rpc_timeout_secs: 10,
        }
    }
}

/// Platform gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Base URL of the platform API.
    pub base_url: String,

    /// Instance id sent with every call.
    pub instance_id: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Skip TLS certificate verification. Development only.
    pub accept_invalid_certs: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            instance_id: String::new(),
            timeout_secs: 15,
            accept_invalid_certs: false,
        }
    }
}

/// Gasless relayer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relayer base URL. Gasless submission is disabled when unset.
    pub url: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 30,
        }
    }
}

/// Background scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run the poll loop.
    pub enabled: bool,

    /// Sleep between ticks in seconds.
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) when RUST_LOG is unset.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
