//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Controller, poller, ledger produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (tracing fmt layer)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields carry the session id through every event
//! - Metric helpers are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
