//! Payment backend interface.
//!
//! # Data Flow
//! ```text
//! session controller
//!     → PaymentBackend (create_session / refresh_quote / get_status)
//!     → http.rs (JSON over HTTP, timeouts, error classification)
//!     → types.rs (CreatedSession, StatusReport, BackendError)
//! ```
//!
//! The backend owns address derivation and ledger watching; this crate
//! only sees the opaque results. Connection-level failures are reported as
//! [`BackendError::Unreachable`] so the controller can tell "no backend"
//! apart from "backend said no".

pub mod http;
pub mod types;

use async_trait::async_trait;

pub use http::HttpBackend;
pub use types::{
    BackendError, BackendResult, CreatedSession, Plan, SessionId, SessionStatus,
    SettlementProof, StatusReport, DEMO_ID_PREFIX,
};

use crate::quoting::Quote;

/// Operations the checkout flow consumes from the payment backend.
#[async_trait]
pub trait PaymentBackend: Send + Sync {
    /// Open a new payment session.
    async fn create_session(&self, plan: Plan, payer_email: &str) -> BackendResult<CreatedSession>;

    /// Issue a replacement quote for an open session.
    async fn refresh_quote(&self, session_id: &SessionId) -> BackendResult<Quote>;

    /// Current confirmation status of a session.
    async fn get_status(&self, session_id: &SessionId) -> BackendResult<StatusReport>;
}
