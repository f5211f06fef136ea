//! Process lifecycle.
//!
//! # Data Flow
//! ```text
//! Ctrl-C received → Shutdown::trigger → controller tears down its session → Exit
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
