//! Bitcoin payment session orchestration.
//!
//! Creates payment sessions against a payment backend, keeps their BTC
//! quote fresh, polls for confirmation, and reconciles quote expiry, the
//! payment window and the poll budget into one lifecycle. Falls back to a
//! local demo flow when the backend cannot be reached.

pub mod backend;
pub mod clock;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod payments;
pub mod quoting;
pub mod session;

pub use backend::{HttpBackend, PaymentBackend, Plan, SessionId};
pub use config::CheckoutConfig;
pub use lifecycle::Shutdown;
pub use session::{CheckoutError, SessionController, SessionObserver};
