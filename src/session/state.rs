//! Session lifecycle state machine.
//!
//! ```text
//!            Begin              Created
//!   Idle ───────────▶ Initializing ───────▶ AwaitingPayment { Fresh ⇄ Stale }
//!    ▲                     │                   │        │        │
//!    │ Cancel (any)        │ CreationFailed    │Confirm │Expire  │Fail
//!    │                     ▼                   ▼        ▼        ▼
//!    └──────────────────  Error            Confirmed  Expired   Error
//! ```
//!
//! Transitions are pure. Terminal states only accept `Begin` (a brand-new
//! session) and `Cancel` (discard).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::payments::ExpiryCause;

/// Whether the displayed quote is still inside its validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteFreshness {
    Fresh,
    Stale,
}

/// Primary lifecycle state of the controller's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    /// No session.
    Idle,
    /// Creation request in flight.
    Initializing,
    /// Waiting for the payer; timers and (for live sessions) the poller run.
    AwaitingPayment { freshness: QuoteFreshness },
    Confirmed,
    Expired { cause: ExpiryCause },
    Error,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Confirmed | LifecycleState::Expired { .. } | LifecycleState::Error
        )
    }

    pub fn is_awaiting_payment(&self) -> bool {
        matches!(self, LifecycleState::AwaitingPayment { .. })
    }

    /// Short label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Initializing => "initializing",
            LifecycleState::AwaitingPayment { .. } => "awaiting_payment",
            LifecycleState::Confirmed => "confirmed",
            LifecycleState::Expired { .. } => "expired",
            LifecycleState::Error => "error",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::AwaitingPayment { freshness } => {
                write!(f, "awaiting_payment ({:?} quote)", freshness)
            }
            LifecycleState::Expired { cause } => write!(f, "expired ({})", cause),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Begin,
    Created,
    CreationFailed,
    QuoteStale,
    QuoteRefreshed,
    Confirm,
    Expire(ExpiryCause),
    Fail,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid lifecycle transition: {event:?} in state {from}")]
pub struct TransitionError {
    pub from: LifecycleState,
    pub event: LifecycleEvent,
}

/// Current lifecycle state plus the transition function.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Idle,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Apply an event, returning the new state.
    ///
    /// On error the state is left untouched.
    pub fn apply(&mut self, event: LifecycleEvent) -> Result<LifecycleState, TransitionError> {
        let next = next_state(self.state, event).ok_or(TransitionError {
            from: self.state,
            event,
        })?;
        self.state = next;
        Ok(next)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

fn next_state(from: LifecycleState, event: LifecycleEvent) -> Option<LifecycleState> {
    use LifecycleEvent as E;
    use LifecycleState as S;

    let awaiting = |freshness| S::AwaitingPayment { freshness };

    match (from, event) {
        (_, E::Cancel) => Some(S::Idle),
        (S::Idle, E::Begin) => Some(S::Initializing),
        (s, E::Begin) if s.is_terminal() => Some(S::Initializing),

        (S::Initializing, E::Created) => Some(awaiting(QuoteFreshness::Fresh)),
        (S::Initializing, E::CreationFailed) => Some(S::Error),

        (S::AwaitingPayment { .. }, E::QuoteStale) => Some(awaiting(QuoteFreshness::Stale)),
        (S::AwaitingPayment { .. }, E::QuoteRefreshed) => Some(awaiting(QuoteFreshness::Fresh)),
        (S::AwaitingPayment { .. }, E::Confirm) => Some(S::Confirmed),
        (S::AwaitingPayment { .. }, E::Expire(cause)) => Some(S::Expired { cause }),
        (S::AwaitingPayment { .. }, E::Fail) => Some(S::Error),

        _ => None,
    }
}
