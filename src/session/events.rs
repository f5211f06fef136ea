//! Observer registry for session events.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::{SessionId, SessionStatus, SettlementProof};
use crate::payments::ExpiryCause;
use crate::quoting::Quote;
use crate::session::error::CheckoutError;
use crate::session::state::LifecycleState;

/// Receiver of controller events. Every method defaults to a no-op.
///
/// Callbacks run on the controller task; they must return quickly and
/// must not await the controller.
pub trait SessionObserver: Send + Sync {
    /// `session_id` is `None` while no session id exists yet.
    fn on_state_change(&self, _session_id: Option<&SessionId>, _state: LifecycleState) {}

    fn on_status(&self, _session_id: &SessionId, _status: SessionStatus, _confirmations: u32) {}

    /// A new quote was installed (creation or refresh).
    fn on_quote(&self, _session_id: &SessionId, _quote: &Quote) {}

    fn on_confirmed(&self, _session_id: &SessionId, _proof: &SettlementProof) {}

    fn on_expired(&self, _session_id: &SessionId, _cause: ExpiryCause) {}

    fn on_error(&self, _session_id: Option<&SessionId>, _error: &CheckoutError) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Subscribed observers, notified in subscription order.
#[derive(Default)]
pub struct Observers {
    next_id: AtomicU64,
    entries: DashMap<ObserverId, Arc<dyn SessionObserver>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn SessionObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.insert(id, observer);
        id
    }

    /// Returns whether the observer was subscribed.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn notify(&self, f: impl Fn(&dyn SessionObserver)) {
        // Snapshot first so observers can (un)subscribe from a callback
        let mut targets: Vec<_> = self
            .entries
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect();
        targets.sort_by_key(|(id, _)| *id);

        for (_, observer) in targets {
            f(observer.as_ref());
        }
    }
}
