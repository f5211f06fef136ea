//! Quote model.
//!
//! # Data Flow
//! ```text
//! backend create/refresh (or demo fallback)
//!     → types.rs (Quote: BTC + sats, validity window)
//!     → tracker.rs (single live quote per session, coalesced refresh)
//!     → session controller (countdown to expires_at_ms)
//! ```
//!
//! # Invariants
//! - `amount_sats == round(amount_btc × 1e8)` for every accepted quote
//! - A replacement quote always expires strictly later than the one it replaces

pub mod tracker;
pub mod types;

pub use tracker::{QuoteTracker, RefreshStart};
pub use types::{duration_ms, Quote, QuoteError, SATS_PER_BTC};
