//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming connection
//!     → listener.rs (accept, pending slot, shutdown gate)
//!     → connection.rs (ID, HeaderReceived on first byte)
//!     → deadline.rs (read deadline enforced on the socket)
//!     → Hand off to HTTP layer
//!
//! Engine reports a state:
//!     → observer.rs (tracker first, then observers)
//!     → tracker.rs (connection table, deadline for the new state)
//!
//! Connection States:
//!     New → HeaderReceived → Active → Idle → HeaderReceived → ...
//!     any → Closed | Hijacked
//! ```
//!
//! # Design Decisions
//! - Deadlines are the only enforcement mechanism: an expired deadline fails
//!   the engine's next read and the engine tears the connection down
//! - Each server owns its tracker; no process-wide connection state

pub mod connection;
pub mod deadline;
pub mod listener;
pub mod observer;
pub mod state;
pub mod tracker;

pub use connection::{ConnHandle, ConnectionId, TrackedConn};
pub use deadline::{Connection, DeadlineStream, ReadDeadline};
pub use listener::{Listener, ListenerGate, TrackingListener};
pub use observer::StateObserver;
pub use state::ConnState;
pub use tracker::ConnTracker;
