//! Demo/offline fallback.
//!
//! When session creation cannot reach the backend at all, the controller
//! swaps in a locally synthesized session so the checkout stays usable.
//! Demo sessions are never polled. They confirm only through an explicit
//! simulate action, and their proofs carry `synthetic = true`.

use uuid::Uuid;

use crate::backend::{Plan, SessionId, SessionStatus, SettlementProof};
use crate::config::{DemoConfig, PricingConfig};
use crate::quoting::{duration_ms, Quote, QuoteError};
use crate::session::types::{PaymentSession, SessionMode};

#[derive(Debug, Clone)]
pub struct DemoFallback {
    config: DemoConfig,
    pricing: PricingConfig,
}

impl DemoFallback {
    pub fn new(config: DemoConfig, pricing: PricingConfig) -> Self {
        Self { config, pricing }
    }

    /// Whether an unreachable backend should produce a demo session.
    pub fn enabled(&self) -> bool {
        self.config.fallback_on_unreachable
    }

    /// Build a demo session starting at `now_ms`.
    pub fn synthesize(
        &self,
        plan: Plan,
        payer_email: String,
        now_ms: u64,
    ) -> Result<PaymentSession, QuoteError> {
        let quote = self.quote(plan, now_ms)?;
        Ok(PaymentSession {
            id: SessionId::demo(),
            plan,
            payer_email,
            address: self.config.placeholder_address.clone(),
            quote,
            payment_window_expires_at_ms: now_ms
                .saturating_add(duration_ms(self.config.payment_window())),
            status: SessionStatus::Pending,
            confirmations: 0,
            settlement_proof: None,
            mode: SessionMode::Demo,
        })
    }

    /// Local replacement for `previous`, always expiring strictly later.
    pub fn requote(&self, plan: Plan, previous: &Quote, now_ms: u64) -> Result<Quote, QuoteError> {
        self.quote(plan, now_ms.max(previous.quoted_at_ms.saturating_add(1)))
    }

    /// Synthetic settlement proof for a demo session.
    pub fn simulate_confirmation(&self, session_id: &SessionId) -> SettlementProof {
        tracing::info!(session_id = %session_id, "Simulating demo confirmation");
        SettlementProof {
            txid: None,
            confirmations: 1,
            unlock_secret: Some(format!("demo-{}", Uuid::new_v4().simple())),
            synthetic: true,
        }
    }

    fn quote(&self, plan: Plan, quoted_at_ms: u64) -> Result<Quote, QuoteError> {
        Quote::from_usd(
            self.pricing.price_for(plan),
            self.config.reference_price_usd,
            quoted_at_ms,
            self.config.quote_validity(),
        )
    }
}
