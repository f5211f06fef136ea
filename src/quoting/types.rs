//! Quote types.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Satoshis per bitcoin.
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Decimal places of a bitcoin amount.
const BTC_DECIMALS: u32 = 8;

/// Errors raised when building or validating a quote.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    #[error("Quote amount must not be negative: {0}")]
    NegativeAmount(Decimal),

    #[error("Reference price must be positive: {0}")]
    InvalidPrice(Decimal),

    #[error("Quote amounts disagree: {btc} BTC is not {sats} sats")]
    InconsistentAmounts { btc: Decimal, sats: u64 },

    #[error("Quote amount does not fit in satoshis: {0}")]
    AmountOverflow(Decimal),

    #[error("Quote window is empty (quoted at {quoted_at_ms}, expires at {expires_at_ms})")]
    EmptyWindow { quoted_at_ms: u64, expires_at_ms: u64 },

    #[error("Quote already expired at {expires_at_ms} (now {now_ms})")]
    AlreadyExpired { expires_at_ms: u64, now_ms: u64 },

    #[error("Quote expiring at {candidate_ms} does not supersede quote expiring at {current_ms}")]
    NotNewer { current_ms: u64, candidate_ms: u64 },
}

/// A time-bound BTC price for one payment session.
///
/// Immutable once built; a refresh produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Amount in BTC.
    pub amount_btc: Decimal,
    /// Same amount in satoshis.
    pub amount_sats: u64,
    /// BTC/USD rate the amount was derived from.
    pub reference_price_usd: Decimal,
    /// Unix ms when the quote was issued.
    pub quoted_at_ms: u64,
    /// Unix ms after which the quote is stale.
    pub expires_at_ms: u64,
}

impl Quote {
    /// Build a quote from a BTC amount, deriving satoshis.
    pub fn new(
        amount_btc: Decimal,
        reference_price_usd: Decimal,
        quoted_at_ms: u64,
        validity: Duration,
    ) -> Result<Self, QuoteError> {
        if amount_btc < Decimal::ZERO {
            return Err(QuoteError::NegativeAmount(amount_btc));
        }
        if reference_price_usd <= Decimal::ZERO {
            return Err(QuoteError::InvalidPrice(reference_price_usd));
        }

        let amount_sats = to_sats(amount_btc)?;
        let quote = Self {
            amount_btc,
            amount_sats,
            reference_price_usd,
            quoted_at_ms,
            expires_at_ms: quoted_at_ms.saturating_add(duration_ms(validity)),
        };
        if quote.expires_at_ms <= quote.quoted_at_ms {
            return Err(QuoteError::EmptyWindow {
                quoted_at_ms,
                expires_at_ms: quote.expires_at_ms,
            });
        }
        Ok(quote)
    }

    /// Convert a USD price into a quote at the given BTC/USD rate.
    ///
    /// The BTC amount is rounded to whole satoshis first so both
    /// denominations agree exactly.
    pub fn from_usd(
        amount_usd: Decimal,
        reference_price_usd: Decimal,
        quoted_at_ms: u64,
        validity: Duration,
    ) -> Result<Self, QuoteError> {
        if reference_price_usd <= Decimal::ZERO {
            return Err(QuoteError::InvalidPrice(reference_price_usd));
        }
        let amount_btc = (amount_usd / reference_price_usd)
            .round_dp_with_strategy(BTC_DECIMALS, RoundingStrategy::MidpointAwayFromZero);
        Self::new(amount_btc, reference_price_usd, quoted_at_ms, validity)
    }

    /// Whether `amount_sats == round(amount_btc × 1e8)`.
    pub fn is_consistent(&self) -> bool {
        matches!(to_sats(self.amount_btc), Ok(sats) if sats == self.amount_sats)
    }

    /// Whether the quote has run out at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// Time left before the quote runs out.
    pub fn remaining(&self, now_ms: u64) -> Duration {
        Duration::from_millis(self.expires_at_ms.saturating_sub(now_ms))
    }

    /// Length of the validity window.
    pub fn validity(&self) -> Duration {
        Duration::from_millis(self.expires_at_ms.saturating_sub(self.quoted_at_ms))
    }

    /// Check a quote received from elsewhere before trusting it.
    pub fn validate(&self, now_ms: u64) -> Result<(), QuoteError> {
        if self.amount_btc < Decimal::ZERO {
            return Err(QuoteError::NegativeAmount(self.amount_btc));
        }
        if self.reference_price_usd <= Decimal::ZERO {
            return Err(QuoteError::InvalidPrice(self.reference_price_usd));
        }
        if !self.is_consistent() {
            return Err(QuoteError::InconsistentAmounts {
                btc: self.amount_btc,
                sats: self.amount_sats,
            });
        }
        if self.expires_at_ms <= self.quoted_at_ms {
            return Err(QuoteError::EmptyWindow {
                quoted_at_ms: self.quoted_at_ms,
                expires_at_ms: self.expires_at_ms,
            });
        }
        if self.is_expired(now_ms) {
            return Err(QuoteError::AlreadyExpired {
                expires_at_ms: self.expires_at_ms,
                now_ms,
            });
        }
        Ok(())
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn to_sats(amount_btc: Decimal) -> Result<u64, QuoteError> {
    (amount_btc * Decimal::from(SATS_PER_BTC))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .ok_or(QuoteError::AmountOverflow(amount_btc))
}
