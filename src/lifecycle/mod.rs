//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind listener → Build server → Serve
//!
//! Shutdown (shutdown.rs):
//!     close() → Stop accepting → Grace idle connections → Drain → Completion
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → close()
//! ```
//!
//! # Design Decisions
//! - Close never interrupts a request already being read or served
//! - Completion is a signal, not a join: any number of tasks can wait on it

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Completion, Drain, Shutdown, ShutdownPhase};
