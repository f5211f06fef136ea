//! Confirmation poller.
//!
//! # Responsibilities
//! - Check a session's status on a fixed interval
//! - Report every successful check, then stop on the first terminal status
//! - Give up after a bounded number of attempts
//!
//! # Design Decisions
//! - A failed check is a missed tick, not a failure; it still uses an attempt
//! - Callbacks run under a gate shared with [`PollHandle::stop`], so once
//!   `stop` returns no callback can fire
//! - Observers must not call `stop` on their own handle from inside a callback

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::backend::{
    BackendResult, PaymentBackend, SessionId, SessionStatus, SettlementProof, StatusReport,
};
use crate::config::PollingConfig;
use crate::observability::metrics;
use crate::payments::types::{ExpiryCause, PollEvent};

/// Receiver of poll loop notifications.
pub trait PollObserver: Send + Sync + 'static {
    /// Fired after every successful check, whether or not the status changed.
    fn on_status(&self, session_id: &SessionId, status: SessionStatus, confirmations: u32);

    /// Fired once when the payment confirms.
    fn on_confirmed(&self, session_id: &SessionId, proof: SettlementProof);

    /// Fired once when the loop gives up or the backend expires the session.
    fn on_expired(&self, session_id: &SessionId, cause: ExpiryCause);

    /// Fired once when the backend reports the session as failed.
    fn on_error(&self, session_id: &SessionId, reason: String) {
        let _ = (session_id, reason);
    }
}

/// Starts poll loops against a backend.
#[derive(Clone)]
pub struct ConfirmationPoller {
    backend: Arc<dyn PaymentBackend>,
    interval: Duration,
    max_attempts: u32,
}

impl ConfirmationPoller {
    pub fn new(backend: Arc<dyn PaymentBackend>, config: &PollingConfig) -> Self {
        Self {
            backend,
            interval: config.interval(),
            max_attempts: config.max_attempts,
        }
    }

    /// Start polling `session_id`. The first check runs one interval from now.
    pub fn start(&self, session_id: SessionId, observer: Arc<dyn PollObserver>) -> PollHandle {
        let gate = Arc::new(Mutex::new(true));
        let attempts = Arc::new(AtomicU32::new(0));

        tracing::debug!(
            session_id = %session_id,
            interval_secs = self.interval.as_secs(),
            max_attempts = self.max_attempts,
            "Confirmation poller starting"
        );

        let task = tokio::spawn(poll_loop(
            self.backend.clone(),
            session_id,
            observer,
            self.interval,
            self.max_attempts,
            gate.clone(),
            attempts.clone(),
        ));

        PollHandle {
            gate,
            attempts,
            task,
        }
    }
}

/// Handle to a running poll loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct PollHandle {
    gate: Arc<Mutex<bool>>,
    attempts: Arc<AtomicU32>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Stop the loop. Idempotent; no callback fires after this returns.
    pub fn stop(&self) {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.task.abort();
    }

    /// Whether the loop may still deliver callbacks.
    pub fn is_active(&self) -> bool {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Status checks issued so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    backend: Arc<dyn PaymentBackend>,
    session_id: SessionId,
    observer: Arc<dyn PollObserver>,
    interval: Duration,
    max_attempts: u32,
    gate: Arc<Mutex<bool>>,
    attempts: Arc<AtomicU32>,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = backend.get_status(&session_id).await;

        let event = classify(&session_id, attempt, max_attempts, outcome);
        if !deliver(&gate, observer.as_ref(), &session_id, event) {
            break;
        }
    }

    tracing::debug!(session_id = %session_id, "Confirmation poller stopped");
}

/// Turn one check outcome into the events it produces.
fn classify(
    session_id: &SessionId,
    attempt: u32,
    max_attempts: u32,
    outcome: BackendResult<StatusReport>,
) -> Vec<PollEvent> {
    let mut events = Vec::with_capacity(2);

    match outcome {
        Ok(report) => {
            metrics::record_poll_check("ok");
            events.push(PollEvent::Status {
                status: report.status,
                confirmations: report.confirmations,
            });
            match report.status {
                SessionStatus::Pending => {}
                SessionStatus::Confirmed => {
                    let proof = report.settlement_proof.unwrap_or_else(|| SettlementProof {
                        txid: None,
                        confirmations: report.confirmations,
                        unlock_secret: None,
                        synthetic: false,
                    });
                    events.push(PollEvent::Confirmed(proof));
                    return events;
                }
                SessionStatus::Expired => {
                    events.push(PollEvent::Expired(ExpiryCause::BackendDeclared));
                    return events;
                }
                SessionStatus::Error => {
                    events.push(PollEvent::Failed("backend reported payment error".to_string()));
                    return events;
                }
            }
        }
        Err(e) => {
            metrics::record_poll_check("missed");
            tracing::warn!(
                session_id = %session_id,
                attempt = attempt,
                error = %e,
                "Status check failed, waiting for next tick"
            );
        }
    }

    if attempt >= max_attempts {
        tracing::info!(
            session_id = %session_id,
            attempts = attempt,
            "Poll attempt budget exhausted"
        );
        events.push(PollEvent::Expired(ExpiryCause::PollBudgetExhausted));
    }
    events
}

/// Deliver events through the gate. Returns whether the loop should continue.
fn deliver(
    gate: &Mutex<bool>,
    observer: &dyn PollObserver,
    session_id: &SessionId,
    events: Vec<PollEvent>,
) -> bool {
    let mut open = gate.lock().unwrap_or_else(PoisonError::into_inner);
    if !*open {
        return false;
    }

    for event in events {
        if event.is_final() {
            *open = false;
        }
        match event {
            PollEvent::Status {
                status,
                confirmations,
            } => observer.on_status(session_id, status, confirmations),
            PollEvent::Confirmed(proof) => observer.on_confirmed(session_id, proof),
            PollEvent::Expired(cause) => observer.on_expired(session_id, cause),
            PollEvent::Failed(reason) => observer.on_error(session_id, reason),
        }
    }
    *open
}
