//! Payment confirmation and settlement.
//!
//! # Data Flow
//! ```text
//! poller.rs: tick → backend status check → PollObserver callbacks
//!     → confirmed: processor.rs hands the proof to an UpgradeFinalizer
//!         → cache.rs (UpgradeLedger) records the entitlement
//! ```

pub mod cache;
pub mod poller;
pub mod processor;
pub mod types;

pub use cache::{AccountUpgrade, UpgradeLedger};
pub use poller::{ConfirmationPoller, PollHandle, PollObserver};
pub use processor::{process_settlement, UpgradeError, UpgradeFinalizer, UpgradeRequest};
pub use types::{ExpiryCause, PollEvent};
