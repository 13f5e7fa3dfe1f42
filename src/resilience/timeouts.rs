//! Read-deadline policy.
//!
//! # Responsibilities
//! - Map a connection state to the read timeout that applies in it
//! - Encode the "new as active" opt-in for brand-new connections
//!
//! # Resolution
//! ```text
//! state            new_as_active=false   new_as_active=true
//! New              idle                  header_read
//! Idle             idle                  idle
//! HeaderReceived   header_read           header_read
//! Active           body_read             body_read
//! Closed/Hijacked  none                  none
//! ```
//!
//! A zero duration resolves to `None`: the current deadline is left as is.

use std::time::Duration;

use crate::config::TimeoutConfig;
use crate::net::state::ConnState;

/// Per-state read timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeoutPolicy {
    pub idle: Duration,
    pub header_read: Duration,
    pub body_read: Duration,
    pub new_as_active: bool,
}

impl TimeoutPolicy {
    /// Timeout to apply on entering `state`, or `None` to leave the deadline untouched.
    pub fn timeout_for(&self, state: ConnState) -> Option<Duration> {
        let timeout = match state {
            ConnState::New if self.new_as_active => self.header_read,
            ConnState::New | ConnState::Idle => self.idle,
            ConnState::HeaderReceived => self.header_read,
            ConnState::Active => self.body_read,
            ConnState::Closed | ConnState::Hijacked => return None,
        };
        (!timeout.is_zero()).then_some(timeout)
    }
}

impl From<&TimeoutConfig> for TimeoutPolicy {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            idle: config.idle(),
            header_read: config.header_read(),
            body_read: config.body_read(),
            new_as_active: config.new_as_active,
        }
    }
}
