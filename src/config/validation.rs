//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and
//! cross-field consistency. All problems are reported, not just the first.

use rust_decimal::Decimal;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::CheckoutConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Longest accepted poll interval or refresh retry delay (one hour).
const MAX_INTERVAL_SECS: u64 = 3600;

/// Longest accepted demo quote validity or payment window (one week).
const MAX_DEMO_WINDOW_SECS: u64 = 7 * 24 * 3600;

/// Longest accepted recurring entitlement (ten years).
const MAX_RECURRING_PERIOD_DAYS: u64 = 3650;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &CheckoutConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match url::Url::parse(&config.backend.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            "backend.base_url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("backend.base_url", e.to_string())),
    }
    if config.backend.request_timeout_secs == 0 {
        errors.push(ValidationError::new("backend.request_timeout_secs", "must be > 0"));
    }
    if config.backend.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("backend.connect_timeout_secs", "must be > 0"));
    }

    if config.polling.interval_secs == 0 || config.polling.interval_secs > MAX_INTERVAL_SECS {
        errors.push(ValidationError::new(
            "polling.interval_secs",
            format!("must be between 1 and {}", MAX_INTERVAL_SECS),
        ));
    }
    if config.polling.max_attempts == 0 {
        errors.push(ValidationError::new("polling.max_attempts", "must be > 0"));
    }
    if config.quotes.refresh_retry_secs == 0 || config.quotes.refresh_retry_secs > MAX_INTERVAL_SECS {
        errors.push(ValidationError::new(
            "quotes.refresh_retry_secs",
            format!("must be between 1 and {}", MAX_INTERVAL_SECS),
        ));
    }

    let demo = &config.demo;
    if demo.placeholder_address.trim().is_empty() {
        errors.push(ValidationError::new("demo.placeholder_address", "must not be empty"));
    }
    if demo.quote_validity_secs == 0 {
        errors.push(ValidationError::new("demo.quote_validity_secs", "must be > 0"));
    }
    if demo.payment_window_secs > MAX_DEMO_WINDOW_SECS {
        errors.push(ValidationError::new(
            "demo.payment_window_secs",
            format!("must be <= {}", MAX_DEMO_WINDOW_SECS),
        ));
    } else if demo.payment_window_secs < demo.quote_validity_secs {
        errors.push(ValidationError::new(
            "demo.payment_window_secs",
            "must be at least demo.quote_validity_secs",
        ));
    }
    if demo.reference_price_usd <= Decimal::ZERO {
        errors.push(ValidationError::new("demo.reference_price_usd", "must be positive"));
    }

    if config.pricing.one_time_usd <= Decimal::ZERO {
        errors.push(ValidationError::new("pricing.one_time_usd", "must be positive"));
    }
    if config.pricing.recurring_usd <= Decimal::ZERO {
        errors.push(ValidationError::new("pricing.recurring_usd", "must be positive"));
    }

    let period_days = config.upgrades.recurring_period_days;
    if period_days == 0 || period_days > MAX_RECURRING_PERIOD_DAYS {
        errors.push(ValidationError::new(
            "upgrades.recurring_period_days",
            format!("must be between 1 and {}", MAX_RECURRING_PERIOD_DAYS),
        ));
    }

    let obs = &config.observability;
    if !LOG_LEVELS.contains(&obs.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", obs.log_level),
        ));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address '{}'", obs.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
