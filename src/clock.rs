//! Wall-clock abstraction.
//!
//! Session deadlines coming from the backend are absolute unix timestamps,
//! while timers run on tokio's monotonic clock. [`TokioClock`] anchors a
//! unix timestamp to a tokio [`Instant`] so both move together, including
//! under `tokio::time::pause()` in tests.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Cap on how far ahead a deadline may be scheduled (roughly 30 years).
const MAX_DEADLINE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Source of the current unix time in milliseconds.
pub trait Clock: Send + Sync + 'static {
    /// Current unix time in milliseconds.
    fn now_ms(&self) -> u64;

    /// Tokio deadline corresponding to an absolute unix timestamp.
    ///
    /// Timestamps in the past map to "now"; far-future ones are capped.
    fn deadline_for(&self, at_ms: u64) -> Instant {
        let remaining = Duration::from_millis(at_ms.saturating_sub(self.now_ms()));
        Instant::now() + remaining.min(MAX_DEADLINE)
    }
}

/// Clock that advances with tokio time.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin_ms: u64,
    origin: Instant,
}

impl TokioClock {
    /// Anchor to the current system time.
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self::starting_at(now)
    }

    /// Anchor to a fixed unix timestamp (deterministic tests).
    pub fn starting_at(origin_ms: u64) -> Self {
        Self {
            origin_ms,
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.origin_ms.saturating_add(elapsed)
    }
}
