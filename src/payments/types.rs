//! Payment confirmation types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::backend::{SessionStatus, SettlementProof};

/// Why a session expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryCause {
    /// The session's payment window deadline passed.
    PaymentWindowElapsed,
    /// The poller used up its attempt budget without a terminal status.
    PollBudgetExhausted,
    /// The backend reported the session as expired.
    BackendDeclared,
}

impl ExpiryCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpiryCause::PaymentWindowElapsed => "payment_window_elapsed",
            ExpiryCause::PollBudgetExhausted => "poll_budget_exhausted",
            ExpiryCause::BackendDeclared => "backend_declared",
        }
    }
}

impl fmt::Display for ExpiryCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification out of a poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// A status check succeeded.
    Status {
        status: SessionStatus,
        confirmations: u32,
    },
    /// The payment confirmed; the loop has stopped.
    Confirmed(SettlementProof),
    /// The loop gave up or the backend expired the session; the loop has stopped.
    Expired(ExpiryCause),
    /// The backend reported the session as failed; the loop has stopped.
    Failed(String),
}

impl PollEvent {
    /// Whether this event ends the poll loop.
    pub fn is_final(&self) -> bool {
        !matches!(self, PollEvent::Status { .. })
    }
}
