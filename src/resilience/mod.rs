//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Connection changes state:
//!     → timeouts.rs (which read deadline applies now)
//!
//! Accept fails:
//!     → backoff.rs (transient? sleep with backoff and retry)
//! ```
//!
//! # Design Decisions
//! - Every waiting state has a deadline unless explicitly configured to zero
//! - Transient accept errors never stop the server

pub mod backoff;
pub mod timeouts;

pub use timeouts::TimeoutPolicy;
