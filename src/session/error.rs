//! Errors surfaced by the session controller.

use thiserror::Error;

use crate::backend::{BackendError, SessionId};
use crate::payments::{ExpiryCause, UpgradeError};
use crate::quoting::Quote;
use crate::session::state::LifecycleState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// The backend rejected the creation request. Requires an explicit retry.
    #[error("Failed to create payment session: {0}")]
    CreationFailure(BackendError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Session {0} not found")]
    NotFound(SessionId),

    #[error("Operation not allowed while {state}")]
    InvalidSessionState { state: LifecycleState },

    #[error("No active payment session")]
    NoActiveSession,

    /// The quote ran out and no replacement has been accepted yet.
    #[error("Quote expired at {} and has not been refreshed yet", .0.expires_at_ms)]
    StaleQuote(Quote),

    #[error("Quote refresh failed: {0}")]
    QuoteRefreshFailure(String),

    #[error("Payment session expired ({0})")]
    SessionExpired(ExpiryCause),

    #[error("Payment session failed: {0}")]
    SessionFailed(String),

    /// Funds have moved but the account upgrade did not go through.
    #[error("Payment confirmed but the account upgrade failed, please contact support: {0}")]
    SettlementUpgradeFailure(UpgradeError),

    #[error("Simulated confirmation is only available for demo sessions")]
    NotDemoSession,

    /// The request was superseded by a cancel or a newer session.
    #[error("Session was cancelled")]
    Cancelled,

    #[error("Session controller has shut down")]
    ControllerClosed,
}

pub type CheckoutResult<T> = Result<T, CheckoutError>;
