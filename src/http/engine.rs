//! The engine seam.
//!
//! The engine owns everything protocol-level: parsing, routing, handler
//! invocation. The overlay only needs it to serve one connection at a time,
//! report how that connection moves between states, and stop offering
//! keep-alive when asked.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::net::connection::{ConnHandle, ConnectionId};
use crate::net::observer::Transitions;
use crate::net::state::ConnState;

/// Connection states as the engine sees them. The overlay adds
/// `HeaderReceived` on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    New,
    Active,
    Idle,
    Hijacked,
    Closed,
}

impl From<EngineState> for ConnState {
    fn from(state: EngineState) -> Self {
        match state {
            EngineState::New => ConnState::New,
            EngineState::Active => ConnState::Active,
            EngineState::Idle => ConnState::Idle,
            EngineState::Hijacked => ConnState::Hijacked,
            EngineState::Closed => ConnState::Closed,
        }
    }
}

/// A request-serving engine driven by the overlay's accept loop.
pub trait Engine: Send + Sync + 'static {
    /// Serve `io` until it closes or is hijacked, reporting every state change
    /// through `hook`. Runs on its own task.
    fn serve_connection<I>(&self, io: I, hook: ConnHook) -> impl Future<Output = ()> + Send + 'static
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Stop (or resume) offering keep-alive on responses and new connections.
    fn set_keep_alives_enabled(&self, enabled: bool);
}

struct HookInner {
    handle: ConnHandle,
    transitions: Arc<Transitions>,
    finished: AtomicBool,
}

impl Drop for HookInner {
    fn drop(&mut self) {
        // An engine that bails out without reporting still frees the slot.
        if !self.finished.swap(true, Ordering::AcqRel) {
            self.transitions.notify(&self.handle, ConnState::Closed);
        }
    }
}

/// The engine's notification hook for one connection.
///
/// Exactly one terminal state is delivered per connection: later reports are
/// ignored, and dropping the last clone without one reports `Closed`.
#[derive(Clone)]
pub struct ConnHook {
    inner: Arc<HookInner>,
}

impl ConnHook {
    pub fn new(handle: ConnHandle, transitions: Arc<Transitions>) -> Self {
        Self {
            inner: Arc::new(HookInner {
                handle,
                transitions,
                finished: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.handle.id()
    }

    pub fn report(&self, state: EngineState) {
        let state = ConnState::from(state);
        let finished = if state.is_terminal() {
            self.inner.finished.swap(true, Ordering::AcqRel)
        } else {
            self.inner.finished.load(Ordering::Acquire)
        };
        if finished {
            tracing::trace!(connection_id = %self.id(), state = %state, "Ignoring report after terminal state");
            return;
        }
        self.inner.transitions.notify(&self.inner.handle, state);
    }
}

impl std::fmt::Debug for ConnHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnHook")
            .field("id", &self.id())
            .field("finished", &self.inner.finished.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::config::ShutdownConfig;
    use crate::lifecycle::shutdown::Drain;
    use crate::net::deadline::ReadDeadline;
    use crate::net::observer::StateObserver;
    use crate::net::tracker::ConnTracker;
    use crate::resilience::TimeoutPolicy;

    fn hook() -> (ConnHook, Arc<Mutex<Vec<ConnState>>>, Arc<Drain>) {
        let drain = Arc::new(Drain::new());
        let tracker = Arc::new(ConnTracker::new(
            TimeoutPolicy::default(),
            &ShutdownConfig::default(),
            Arc::clone(&drain),
        ));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: StateObserver = Arc::new(move |_, state| sink.lock().unwrap().push(state));
        let transitions = Arc::new(Transitions::new(tracker, vec![observer]));
        drain.acquire();
        (
            ConnHook::new(ConnHandle::new(ReadDeadline::new(), false), transitions),
            seen,
            drain,
        )
    }

    #[test]
    fn maps_engine_states() {
        assert_eq!(ConnState::from(EngineState::New), ConnState::New);
        assert_eq!(ConnState::from(EngineState::Active), ConnState::Active);
        assert_eq!(ConnState::from(EngineState::Idle), ConnState::Idle);
        assert_eq!(ConnState::from(EngineState::Hijacked), ConnState::Hijacked);
        assert_eq!(ConnState::from(EngineState::Closed), ConnState::Closed);
    }

    #[test]
    fn only_first_terminal_state_is_delivered() {
        let (hook, seen, drain) = hook();
        hook.report(EngineState::New);
        hook.report(EngineState::Hijacked);
        hook.report(EngineState::Closed);
        hook.report(EngineState::Idle);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ConnState::New, ConnState::Hijacked]
        );
        assert_eq!(drain.pending(), 0);
    }

    #[test]
    fn dropping_unfinished_hook_reports_closed() {
        let (hook, seen, drain) = hook();
        let clone = hook.clone();
        hook.report(EngineState::New);

        drop(hook);
        assert_eq!(seen.lock().unwrap().len(), 1);

        drop(clone);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ConnState::New, ConnState::Closed]
        );
        assert_eq!(drain.pending(), 0);
    }
}
