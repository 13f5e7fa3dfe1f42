//! Connection-lifecycle overlay for HTTP servers.
//!
//! Wraps a listener and a request-serving engine to enforce per-state read
//! deadlines (idle, header read, body read) and to shut down gracefully:
//! stop accepting, cut idle connections after a short grace period, let
//! in-flight requests finish, and signal when every connection is gone.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;

pub use config::schema::ServerConfig;
pub use error::ServeError;
pub use http::{Engine, HttpServer, HyperEngine};
pub use lifecycle::{Completion, Shutdown, ShutdownPhase};
pub use net::{ConnState, ConnectionId, Listener};
pub use resilience::TimeoutPolicy;
