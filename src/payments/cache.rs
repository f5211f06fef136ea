//! Account upgrade ledger and persistence.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Plan, SessionId};
use crate::clock::Clock;
use crate::observability::metrics;
use crate::payments::processor::{UpgradeError, UpgradeFinalizer, UpgradeRequest};
use crate::quoting::duration_ms;

/// A payer's recorded entitlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpgrade {
    pub plan: Plan,
    /// Sessions already applied to this entry.
    pub sessions: Vec<SessionId>,
    /// Unix ms of the most recent upgrade.
    pub upgraded_at_ms: u64,
    /// End of the entitlement for recurring plans; `None` never lapses.
    pub expires_at_ms: Option<u64>,
}

impl AccountUpgrade {
    /// Whether the entitlement is in force at `now_ms`.
    pub fn is_active(&self, now_ms: u64) -> bool {
        self.expires_at_ms.map_or(true, |expiry| expiry > now_ms)
    }
}

/// Thread-safe upgrade ledger keyed by payer email.
#[derive(Clone)]
pub struct UpgradeLedger {
    inner: Arc<DashMap<String, AccountUpgrade>>,
    clock: Arc<dyn Clock>,
    recurring_period: Duration,
    persistence_path: Option<String>,
}

impl UpgradeLedger {
    /// Create a new empty ledger.
    pub fn new(clock: Arc<dyn Clock>, recurring_period: Duration, persistence_path: Option<String>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            clock,
            recurring_period,
            persistence_path,
        }
    }

    /// Load from file if it exists.
    pub fn load_from_file(
        path: &str,
        clock: Arc<dyn Clock>,
        recurring_period: Duration,
    ) -> std::io::Result<Self> {
        let ledger = Self::new(clock, recurring_period, Some(path.to_string()));
        if Path::new(path).exists() {
            let reader = BufReader::new(File::open(path)?);
            let map: HashMap<String, AccountUpgrade> = serde_json::from_reader(reader)?;
            for (k, v) in map {
                ledger.inner.insert(k, v);
            }
            metrics::record_ledger_size(ledger.inner.len());
            tracing::info!("Loaded {} account upgrades from ledger file", ledger.inner.len());
        }
        Ok(ledger)
    }

    /// Save to file.
    pub fn save_to_file(&self) -> std::io::Result<()> {
        if let Some(path) = &self.persistence_path {
            let writer = BufWriter::new(File::create(path)?);
            let map: HashMap<_, _> = self
                .inner
                .iter()
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect();
            serde_json::to_writer(writer, &map)?;
            tracing::debug!("Saved {} account upgrades to ledger file", map.len());
        }
        Ok(())
    }

    /// Apply one confirmed session. Returns `false` if it was already applied.
    pub fn apply(&self, request: &UpgradeRequest) -> Result<bool, UpgradeError> {
        if request.proof.synthetic {
            return Err(UpgradeError::SyntheticProof(request.session_id.clone()));
        }

        let now = self.clock.now_ms();
        let key = normalize_email(&request.payer_email);
        let period_ms = duration_ms(self.recurring_period);

        let mut entry = self.inner.entry(key).or_insert_with(|| AccountUpgrade {
            plan: request.plan,
            sessions: Vec::new(),
            upgraded_at_ms: now,
            expires_at_ms: Some(now),
        });
        if entry.sessions.contains(&request.session_id) {
            return Ok(false);
        }

        entry.sessions.push(request.session_id.clone());
        entry.upgraded_at_ms = now;
        match request.plan {
            Plan::OneTime => {
                entry.plan = Plan::OneTime;
                entry.expires_at_ms = None;
            }
            Plan::Recurring => {
                // A lifetime purchase is never downgraded by a subscription payment
                if entry.plan == Plan::Recurring || entry.expires_at_ms.is_some() {
                    let base = entry.expires_at_ms.unwrap_or(now).max(now);
                    entry.plan = Plan::Recurring;
                    entry.expires_at_ms = Some(base.saturating_add(period_ms));
                }
            }
        }
        drop(entry);

        metrics::record_ledger_size(self.inner.len());
        Ok(true)
    }

    /// Entitlement for a payer, if any.
    pub fn get(&self, payer_email: &str) -> Option<AccountUpgrade> {
        self.inner.get(&normalize_email(payer_email)).map(|r| r.value().clone())
    }

    /// Number of payers in the ledger.
    pub fn count(&self) -> usize {
        self.inner.len()
    }

    /// (active, lapsed) entitlement counts.
    pub fn get_summary(&self) -> (usize, usize) {
        let now = self.clock.now_ms();
        let mut active = 0;
        let mut lapsed = 0;
        for r in self.inner.iter() {
            if r.value().is_active(now) {
                active += 1;
            } else {
                lapsed += 1;
            }
        }
        (active, lapsed)
    }

    /// All entries, sorted by payer.
    pub fn entries(&self) -> Vec<(String, AccountUpgrade)> {
        let mut entries: Vec<_> = self
            .inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[async_trait]
impl UpgradeFinalizer for UpgradeLedger {
    async fn finalize(&self, request: &UpgradeRequest) -> Result<(), UpgradeError> {
        if self.apply(request)? {
            self.save_to_file()
                .map_err(|e| UpgradeError::Store(e.to_string()))?;
        } else {
            tracing::debug!(session_id = %request.session_id, "Upgrade already applied");
        }
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
