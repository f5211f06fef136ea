//! Backend contract types and error definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::quoting::Quote;

/// Prefix marking ids synthesized locally by the demo fallback.
pub const DEMO_ID_PREFIX: &str = "demo-";

/// Opaque payment session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh id for a locally synthesized demo session.
    pub fn demo() -> Self {
        Self(format!("{}{}", DEMO_ID_PREFIX, Uuid::new_v4().simple()))
    }

    /// Whether this id was synthesized by the demo fallback.
    pub fn is_demo(&self) -> bool {
        self.0.starts_with(DEMO_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Product tier being purchased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Plan {
    /// Single report purchase.
    OneTime,
    /// Recurring subscription.
    Recurring,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::OneTime => "one-time",
            Plan::Recurring => "recurring",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one-time" | "one_time" | "onetime" => Ok(Plan::OneTime),
            "recurring" | "subscription" => Ok(Plan::Recurring),
            other => Err(format!("unknown plan '{}'", other)),
        }
    }
}

/// Payment status as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Confirmed,
    Expired,
    Error,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Pending)
    }
}

/// Evidence that a payment settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementProof {
    /// Settling transaction id, when the backend discloses it.
    #[serde(default)]
    pub txid: Option<String>,
    /// Confirmations observed when the proof was issued.
    #[serde(default)]
    pub confirmations: u32,
    /// Secret unlocking the paid deliverable.
    #[serde(default)]
    pub unlock_secret: Option<String>,
    /// Set on proofs produced by the demo fallback; billing must ignore these.
    #[serde(default)]
    pub synthetic: bool,
}

/// Response to a session creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSession {
    pub session_id: SessionId,
    pub address: String,
    pub quote: Quote,
    pub payment_window_expires_at_ms: u64,
}

/// Response to a status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: SessionStatus,
    #[serde(default)]
    pub confirmations: u32,
    #[serde(default)]
    pub settlement_proof: Option<SettlementProof>,
}

impl StatusReport {
    pub fn pending(confirmations: u32) -> Self {
        Self {
            status: SessionStatus::Pending,
            confirmations,
            settlement_proof: None,
        }
    }
}

/// Errors that can occur talking to the payment backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend could not be reached at all (connection level).
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// The backend accepted the connection but did not answer in time.
    #[error("Backend request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Session {0} not found")]
    NotFound(SessionId),

    #[error("Session {0} is not in a state that allows this request")]
    InvalidSessionState(SessionId),

    /// Business-level rejection.
    #[error("Backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
