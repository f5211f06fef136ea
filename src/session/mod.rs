//! Payment session orchestration.
//!
//! # Data Flow
//! ```text
//! create(plan, email)
//!     → controller.rs: backend create_session
//!         → ok: live session, ConfirmationPoller started
//!         → unreachable: demo.rs synthesizes a session (no poller)
//!         → rejected: Error
//!     → window / quote countdowns, coalesced quote refreshes
//!     → poll events → state.rs transitions → events.rs observers + watch
//!     → Confirmed (live): proof handed to the UpgradeFinalizer
//! ```

pub mod controller;
pub mod demo;
pub mod error;
pub mod events;
pub mod state;
pub mod types;

pub use controller::{ControllerDeps, SessionController};
pub use demo::DemoFallback;
pub use error::{CheckoutError, CheckoutResult};
pub use events::{ObserverId, Observers, SessionObserver};
pub use state::{Lifecycle, LifecycleEvent, LifecycleState, QuoteFreshness, TransitionError};
pub use types::{PaymentSession, SessionMode, SessionSnapshot, UpgradeStatus};
