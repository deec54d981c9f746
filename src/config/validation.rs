//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: KmsConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{KmsConfig, SecretBackend};

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    match url::Url::parse(value) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
        Ok(u) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", u.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &KmsConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            "must be a socket address",
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }
    if config.store.path.trim().is_empty() {
        errors.push(ValidationError::new("store.path", "must not be empty"));
    }

    match config.secrets.backend {
        SecretBackend::Vault => {
            check_url(&mut errors, "secrets.vault.address", &config.secrets.vault.address);
            if config.secrets.vault.timeout_secs == 0 {
                errors.push(ValidationError::new("secrets.vault.timeout_secs", "must be > 0"));
            }
        }
        SecretBackend::Local => {
            if !config.secrets.allow_insecure_local {
                errors.push(ValidationError::new(
                    "secrets.allow_insecure_local",
                    "must be true to use the local backend",
                ));
            }
            let local = &config.secrets.local;
            if local.argon2_parallelism == 0 || local.argon2_iterations == 0 {
                errors.push(ValidationError::new(
                    "secrets.local",
                    "argon2 iterations and parallelism must be > 0",
                ));
            }
            if local.argon2_memory_kib < 8 * local.argon2_parallelism {
                errors.push(ValidationError::new(
                    "secrets.local.argon2_memory_kib",
                    "must be at least 8 KiB per lane",
                ));
            }
        }
    }

    check_url(&mut errors, "chain.rpc_url", &config.chain.rpc_url);
    for (i, url) in config.chain.failover_urls.iter().enumerate() {
        check_url(&mut errors, &format!("chain.failover_urls[{}]", i), url);
    }
    if config.chain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("chain.rpc_timeout_secs", "must be > 0"));
    }

    check_url(&mut errors, "platform.base_url", &config.platform.base_url);
    if config.platform.instance_id.trim().is_empty() {
        errors.push(ValidationError::new("platform.instance_id", "must not be empty"));
    }

    if let Some(url) = &config.relay.url {
        check_url(&mut errors, "relay.url", url);
    }

    if config.scheduler.enabled && config.scheduler.interval_secs == 0 {
        errors.push(ValidationError::new("scheduler.interval_secs", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
