//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Connection transitions, accepts, shutdown
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges, Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
