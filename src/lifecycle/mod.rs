//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Store → Secret backend → Clients → Wiring
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Stop scheduler → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     Second signal  → Forced exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then custody, then listeners
//! - Shutdown has timeout: forced exit after deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{bootstrap, Services, StartupError};
