//! Session data model.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::backend::{CreatedSession, Plan, SessionId, SessionStatus, SettlementProof};
use crate::quoting::Quote;
use crate::session::error::CheckoutError;
use crate::session::state::LifecycleState;

/// Where a session came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Issued by the payment backend and polled for confirmation.
    Live,
    /// Synthesized locally because the backend was unreachable.
    Demo,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Live => "live",
            SessionMode::Demo => "demo",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payment request owned by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub id: SessionId,
    pub plan: Plan,
    pub payer_email: String,
    /// Destination value; format owned by the backend.
    pub address: String,
    pub quote: Quote,
    /// Fixed at creation, never extended by quote refreshes.
    pub payment_window_expires_at_ms: u64,
    pub status: SessionStatus,
    pub confirmations: u32,
    pub settlement_proof: Option<SettlementProof>,
    pub mode: SessionMode,
}

impl PaymentSession {
    pub fn live(created: CreatedSession, plan: Plan, payer_email: String) -> Self {
        Self {
            id: created.session_id,
            plan,
            payer_email,
            address: created.address,
            quote: created.quote,
            payment_window_expires_at_ms: created.payment_window_expires_at_ms,
            status: SessionStatus::Pending,
            confirmations: 0,
            settlement_proof: None,
            mode: SessionMode::Live,
        }
    }

    pub fn is_demo(&self) -> bool {
        self.mode == SessionMode::Demo
    }

    /// Secret unlocking the paid deliverable, once confirmed.
    pub fn unlock_secret(&self) -> Option<&str> {
        self.settlement_proof
            .as_ref()
            .and_then(|proof| proof.unlock_secret.as_deref())
    }
}

/// Progress of the account upgrade that follows a confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeStatus {
    /// No confirmed session yet.
    NotApplicable,
    Pending,
    Completed,
    /// Demo confirmation; nothing is sent to billing.
    Skipped,
    Failed(String),
}

/// Point-in-time view of the controller, published on every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: LifecycleState,
    pub session: Option<PaymentSession>,
    pub last_error: Option<CheckoutError>,
    pub upgrade: UpgradeStatus,
}

impl SessionSnapshot {
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(|s| &s.id)
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: LifecycleState::Idle,
            session: None,
            last_error: None,
            upgrade: UpgradeStatus::NotApplicable,
        }
    }
}
