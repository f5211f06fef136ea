//! Hand-off of confirmed payments to the account upgrade collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{Plan, SessionId, SettlementProof};

/// Everything the upgrade side needs to grant a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeRequest {
    pub session_id: SessionId,
    pub plan: Plan,
    pub payer_email: String,
    pub proof: SettlementProof,
}

/// Errors from the account upgrade collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpgradeError {
    /// Demo proofs never reach billing.
    #[error("Refusing to upgrade from synthetic settlement proof for session {0}")]
    SyntheticProof(SessionId),

    #[error("Upgrade store error: {0}")]
    Store(String),

    #[error("Upgrade rejected: {0}")]
    Rejected(String),
}

/// Out-of-scope collaborator that turns a confirmed payment into an
/// account upgrade. Implementations must be idempotent per session id.
#[async_trait]
pub trait UpgradeFinalizer: Send + Sync {
    async fn finalize(&self, request: &UpgradeRequest) -> Result<(), UpgradeError>;
}

/// Finalize a confirmed payment, logging the outcome.
pub async fn process_settlement(
    finalizer: &dyn UpgradeFinalizer,
    request: &UpgradeRequest,
) -> Result<(), UpgradeError> {
    tracing::info!(
        session_id = %request.session_id,
        plan = %request.plan,
        confirmations = request.proof.confirmations,
        "Finalizing account upgrade"
    );

    match finalizer.finalize(request).await {
        Ok(()) => {
            crate::observability::metrics::record_upgrade("completed");
            tracing::info!(session_id = %request.session_id, "Account upgrade finalized");
            Ok(())
        }
        Err(e) => {
            crate::observability::metrics::record_upgrade("failed");
            // Funds have moved at this point; this needs a human.
            tracing::error!(
                session_id = %request.session_id,
                payer = %request.payer_email,
                error = %e,
                "Payment confirmed but account upgrade failed"
            );
            Err(e)
        }
    }
}
