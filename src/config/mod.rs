//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, env overrides)
//!     → validation.rs (semantic checks)
//!     → CheckoutConfig (validated, immutable)
//!     → handed to the session controller and HTTP backend at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_with_env, ConfigError};
pub use schema::{
    BackendConfig, CheckoutConfig, DemoConfig, ObservabilityConfig, PollingConfig,
    PricingConfig, QuoteConfig, UpgradeConfig,
};
pub use validation::{validate_config, ValidationError};
