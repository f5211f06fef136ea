//! Configuration schema definitions.
//!
//! All sections derive Serde traits for deserialization from TOML and
//! carry defaults so a minimal (or empty) file is valid.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backend::Plan;

/// Root configuration for the checkout client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CheckoutConfig {
    /// Payment backend connection.
    pub backend: BackendConfig,

    /// Confirmation polling cadence and budget.
    pub polling: PollingConfig,

    /// Quote refresh behaviour.
    pub quotes: QuoteConfig,

    /// Offline demo fallback.
    pub demo: DemoConfig,

    /// USD list prices (used for locally synthesized quotes).
    pub pricing: PricingConfig,

    /// Account upgrade ledger.
    pub upgrades: UpgradeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Payment backend connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the payment API (e.g., "https://pay.example.com").
    pub base_url: String,

    /// Total request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout_secs: 10,
            connect_timeout_secs: 5,
        }
    }
}

/// Confirmation poller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between status checks.
    pub interval_secs: u64,

    /// Maximum number of status checks before giving up locally.
    pub max_attempts: u32,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            // 30 minutes at the default interval
            max_attempts: 360,
        }
    }
}

/// Quote refresh configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuoteConfig {
    /// Delay before retrying a failed automatic refresh of a stale quote.
    pub refresh_retry_secs: u64,
}

impl QuoteConfig {
    pub fn refresh_retry(&self) -> Duration {
        Duration::from_secs(self.refresh_retry_secs)
    }
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            refresh_retry_secs: 10,
        }
    }
}

/// Demo fallback configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Fall back to a demo session when the backend cannot be reached.
    pub fallback_on_unreachable: bool,

    /// Address shown for demo sessions.
    pub placeholder_address: String,

    /// Validity of locally synthesized quotes in seconds.
    pub quote_validity_secs: u64,

    /// Payment window of demo sessions in seconds.
    pub payment_window_secs: u64,

    /// BTC/USD rate used for demo quotes.
    pub reference_price_usd: Decimal,
}

impl DemoConfig {
    pub fn quote_validity(&self) -> Duration {
        Duration::from_secs(self.quote_validity_secs)
    }

    pub fn payment_window(&self) -> Duration {
        Duration::from_secs(self.payment_window_secs)
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            fallback_on_unreachable: true,
            placeholder_address: "bc1qdemo0000000000000000000000000000000000".to_string(),
            quote_validity_secs: 60,
            payment_window_secs: 30 * 60,
            reference_price_usd: dec!(60000),
        }
    }
}

/// USD list prices per plan.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PricingConfig {
    pub one_time_usd: Decimal,
    pub recurring_usd: Decimal,
}

impl PricingConfig {
    pub fn price_for(&self, plan: Plan) -> Decimal {
        match plan {
            Plan::OneTime => self.one_time_usd,
            Plan::Recurring => self.recurring_usd,
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            one_time_usd: dec!(29.00),
            recurring_usd: dec!(9.00),
        }
    }
}

/// Account upgrade ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// JSON file the ledger is persisted to. In-memory only when unset.
    pub ledger_path: Option<String>,

    /// Entitlement length granted per recurring payment, in days.
    pub recurring_period_days: u64,
}

impl UpgradeConfig {
    pub fn recurring_period(&self) -> Duration {
        Duration::from_secs(self.recurring_period_days.saturating_mul(24 * 3600))
    }
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            ledger_path: None,
            recurring_period_days: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
