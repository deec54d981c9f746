//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::env::{self, SCHEDULER_DURATION_ENV};
use crate::config::schema::KmsConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
    /// A required environment variable is missing or malformed.
    Env(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
            ConfigError::Env(msg) => write!(f, "Environment error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse, apply environment overrides and validate.
pub fn parse_config(content: &str) -> Result<KmsConfig, ConfigError> {
    let mut config: KmsConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    apply_env_overrides(&mut config)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<KmsConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// `SCHEDULER_DURATION` (seconds) overrides `scheduler.interval_secs`.
pub fn apply_env_overrides(config: &mut KmsConfig) -> Result<(), ConfigError> {
    if let Some(raw) = env::optional(SCHEDULER_DURATION_ENV) {
        let secs = raw.trim().parse::<u64>().map_err(|_| {
            ConfigError::Env(format!(
                "{} must be a number of seconds, got '{}'",
                SCHEDULER_DURATION_ENV, raw
            ))
        })?;
        config.scheduler.interval_secs = secs;
    }
    Ok(())
}
