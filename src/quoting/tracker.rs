//! Current-quote bookkeeping for one session.
//!
//! Holds the session's single live quote and coalesces refresh requests:
//! callers that ask for a refresh while one is in flight are parked as
//! waiters and all receive the outcome of that one call.

use crate::quoting::types::{Quote, QuoteError};

/// Outcome of [`QuoteTracker::begin_refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStart {
    /// No refresh was running; the caller must issue one.
    Issue,
    /// A refresh is already in flight; the waiter was attached to it.
    Joined,
}

/// The current quote of a session plus any pending refresh waiters.
#[derive(Debug)]
pub struct QuoteTracker<W> {
    current: Quote,
    in_flight: Option<Vec<W>>,
}

impl<W> QuoteTracker<W> {
    pub fn new(quote: Quote) -> Self {
        Self {
            current: quote,
            in_flight: None,
        }
    }

    /// The quote currently shown to the payer (possibly stale).
    pub fn current(&self) -> &Quote {
        &self.current
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Register interest in a refresh.
    pub fn begin_refresh(&mut self, waiter: Option<W>) -> RefreshStart {
        match &mut self.in_flight {
            Some(waiters) => {
                waiters.extend(waiter);
                RefreshStart::Joined
            }
            None => {
                self.in_flight = Some(waiter.into_iter().collect());
                RefreshStart::Issue
            }
        }
    }

    /// Install a refreshed quote if it is valid and supersedes the current one.
    ///
    /// Either way the in-flight refresh is finished and its waiters are
    /// handed back. On rejection the previous quote stays in place.
    pub fn complete(&mut self, candidate: Quote, now_ms: u64) -> (Vec<W>, Result<(), QuoteError>) {
        let waiters = self.in_flight.take().unwrap_or_default();
        let verdict = self.check_candidate(&candidate, now_ms);
        if verdict.is_ok() {
            self.current = candidate;
        }
        (waiters, verdict)
    }

    /// Finish the in-flight refresh without a new quote.
    pub fn fail(&mut self) -> Vec<W> {
        self.in_flight.take().unwrap_or_default()
    }

    fn check_candidate(&self, candidate: &Quote, now_ms: u64) -> Result<(), QuoteError> {
        candidate.validate(now_ms)?;
        if candidate.expires_at_ms <= self.current.expires_at_ms {
            return Err(QuoteError::NotNewer {
                current_ms: self.current.expires_at_ms,
                candidate_ms: candidate.expires_at_ms,
            });
        }
        Ok(())
    }
}
