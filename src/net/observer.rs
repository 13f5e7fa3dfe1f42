//! State-transition fan-out.
//!
//! The overlay's own handler (the connection tracker) always runs first;
//! registered observers follow in registration order. Every transition of a
//! given connection is delivered on that connection's task, so observers see
//! per-connection transitions in order.

use std::fmt;
use std::sync::Arc;

use crate::net::connection::{ConnHandle, ConnectionId};
use crate::net::state::ConnState;
use crate::net::tracker::ConnTracker;
use crate::observability::metrics;

/// Callback notified on every connection state change.
pub type StateObserver = Arc<dyn Fn(ConnectionId, ConnState) + Send + Sync>;

/// Ordered chain: tracker first, then observers.
pub struct Transitions {
    tracker: Arc<ConnTracker>,
    observers: Vec<StateObserver>,
}

impl Transitions {
    pub fn new(tracker: Arc<ConnTracker>, observers: Vec<StateObserver>) -> Self {
        Self { tracker, observers }
    }

    pub fn tracker(&self) -> &Arc<ConnTracker> {
        &self.tracker
    }

    pub fn notify(&self, conn: &ConnHandle, state: ConnState) {
        tracing::trace!(connection_id = %conn.id(), state = %state, "Connection state changed");
        metrics::record_transition(state);

        self.tracker.on_transition(conn, state);
        for observer in &self.observers {
            observer(conn.id(), state);
        }
    }
}

impl fmt::Debug for Transitions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transitions")
            .field("tracker", &self.tracker)
            .field("observers", &self.observers.len())
            .finish()
    }
}
