//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! TrackedConn (from the net layer)
//!     → server.rs (accept loop, spawn per connection, close)
//!     → engine.rs (Engine seam, ConnHook state reports)
//!     → hyper_engine.rs (hyper HTTP/1 + axum Router)
//!     → response.rs (Idle on body drop, Connection: close)
//! ```

pub mod engine;
pub mod hyper_engine;
pub mod response;
pub mod server;

pub use engine::{ConnHook, Engine, EngineState};
pub use hyper_engine::HyperEngine;
pub use server::HttpServer;
