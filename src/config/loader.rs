//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::CheckoutConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Overrides the backend base URL.
pub const BACKEND_URL_ENV_VAR: &str = "CHECKOUT_BACKEND_URL";

/// Overrides the configured log level.
pub const LOG_LEVEL_ENV_VAR: &str = "CHECKOUT_LOG_LEVEL";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
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
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<CheckoutConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<CheckoutConfig, ConfigError> {
    let config: CheckoutConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load from `path` if given, otherwise start from defaults; then apply
/// environment overrides and validate the result.
pub fn load_with_env(path: Option<&Path>) -> Result<CheckoutConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => CheckoutConfig::default(),
    };
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn apply_overrides(config: &mut CheckoutConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup(BACKEND_URL_ENV_VAR) {
        tracing::debug!(url = %url, "Backend URL overridden from environment");
        config.backend.base_url = url;
    }
    if let Some(level) = lookup(LOG_LEVEL_ENV_VAR) {
        config.observability.log_level = level;
    }
}
