//! Credentials read from the environment.
//!
//! Tokens and passwords are never part of the config file.

use secrecy::SecretString;

use crate::config::loader::ConfigError;
use crate::config::schema::{KmsConfig, SecretBackend};

/// Vault token for the remote backend.
pub const VAULT_TOKEN_ENV: &str = "VAULT_TOKEN";
/// Password for the local backend's key derivation.
pub const WALLET_PASSWORD_ENV: &str = "WALLET_PASSWORD";
/// Value of the `Authorization` header sent to the platform.
pub const PLATFORM_AUTH_TOKEN_ENV: &str = "PLATFORM_AUTH_TOKEN";
/// Scheduler interval override, in seconds.
pub const SCHEDULER_DURATION_ENV: &str = "SCHEDULER_DURATION";

/// Non-empty value of an environment variable.
pub fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn required(name: &str) -> Result<SecretString, ConfigError> {
    optional(name)
        .map(SecretString::from)
        .ok_or_else(|| ConfigError::Env(format!("environment variable {} is not set", name)))
}

/// Credentials required by the configured backends.
#[derive(Debug)]
pub struct Credentials {
    pub vault_token: Option<SecretString>,
    pub wallet_password: Option<SecretString>,
    pub platform_auth_token: SecretString,
}

impl Credentials {
    /// Read the credentials the given configuration needs.
    pub fn from_env(config: &KmsConfig) -> Result<Self, ConfigError> {
        let (vault_token, wallet_password) = match config.secrets.backend {
            SecretBackend::Vault => (Some(required(VAULT_TOKEN_ENV)?), None),
            SecretBackend::Local => (None, Some(required(WALLET_PASSWORD_ENV)?)),
        };
        Ok(Self {
            vault_token,
            wallet_password,
            platform_auth_token: required(PLATFORM_AUTH_TOKEN_ENV)?,
        })
    }
}
