//! Connection state machine.
//!
//! # State Transitions
//! ```text
//! New ──▶ HeaderReceived ──▶ Active ──▶ Idle ──▶ HeaderReceived ──▶ ...
//!  │                                      │
//!  └──────────────┬───────────────────────┘
//!                 ▼
//!        Closed | Hijacked (terminal)
//! ```
//!
//! `HeaderReceived` is synthesized by the overlay when the first byte of a
//! request arrives on an idle connection. Every other state is reported by
//! the engine and translated through `From<EngineState>`.

use std::fmt;

/// Lifecycle state of an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnState {
    /// Accepted, nothing served yet.
    New,
    /// Open between requests.
    Idle,
    /// At least one byte of a new request has arrived; headers not yet parsed.
    HeaderReceived,
    /// Headers parsed, handler running (body read in progress).
    Active,
    /// Connection terminated.
    Closed,
    /// Connection ownership left the engine (protocol upgrade).
    Hijacked,
}

impl ConnState {
    /// Closed and Hijacked end the lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnState::Closed | ConnState::Hijacked)
    }

    /// True for the states in which request bytes are being consumed.
    pub fn is_request(self) -> bool {
        matches!(self, ConnState::HeaderReceived | ConnState::Active)
    }

    /// Stable label used for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnState::New => "new",
            ConnState::Idle => "idle",
            ConnState::HeaderReceived => "header_received",
            ConnState::Active => "active",
            ConnState::Closed => "closed",
            ConnState::Hijacked => "hijacked",
        }
    }
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
