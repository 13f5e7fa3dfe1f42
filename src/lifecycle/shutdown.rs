//! Shutdown coordination.
//!
//! # State Machine
//! ```text
//! Running ──close()──▶ Closing ──(pending reaches zero)──▶ Stopped
//! ```
//!
//! `close()` stops the listener, disables keep-alives, and gives every idle
//! connection a short grace deadline. Connections mid-request keep whatever
//! deadline their state already assigned and finish their request.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::error::ServeError;
use crate::net::listener::ListenerGate;
use crate::net::tracker::ConnTracker;
use crate::observability::metrics;

/// Phase of the shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Accepting and serving normally.
    Running,
    /// Listener closed, draining connections.
    Closing,
    /// Every accepted connection has terminated.
    Stopped,
}

#[derive(Debug)]
struct DrainState {
    pending: usize,
    accepting: bool,
}

/// Pending-connection counter with a single-fire completion signal.
///
/// One slot is acquired before each accept attempt and released when the
/// attempt fails or the connection reaches Closed/Hijacked. The signal fires
/// once the count is zero and the accept loop has stopped.
#[derive(Debug)]
pub struct Drain {
    state: Mutex<DrainState>,
    done: watch::Sender<bool>,
}

impl Drain {
    pub fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            state: Mutex::new(DrainState {
                pending: 0,
                accepting: true,
            }),
            done,
        }
    }

    pub fn acquire(&self) {
        self.lock().pending += 1;
    }

    pub fn release(&self) {
        let mut state = self.lock();
        match state.pending.checked_sub(1) {
            Some(pending) => state.pending = pending,
            None => tracing::warn!("Pending connection released more than once"),
        }
        self.settle(&state);
    }

    /// The accept loop has exited; no further slots will be acquired.
    pub fn stop_accepting(&self) {
        let mut state = self.lock();
        state.accepting = false;
        self.settle(&state);
    }

    pub fn pending(&self) -> usize {
        self.lock().pending
    }

    pub fn is_complete(&self) -> bool {
        *self.done.borrow()
    }

    pub fn completion(&self) -> Completion {
        Completion {
            rx: self.done.subscribe(),
        }
    }

    fn settle(&self, state: &DrainState) {
        if state.accepting || state.pending > 0 {
            return;
        }
        let fired = self.done.send_if_modified(|done| !std::mem::replace(done, true));
        if fired {
            tracing::info!("All connections drained");
        }
    }

    fn lock(&self) -> MutexGuard<'_, DrainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Drain {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once every accepted connection has terminated and the listener
/// has stopped. Clone it to wait from several places.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<bool>,
}

impl Completion {
    pub fn is_complete(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn wait(mut self) {
        // A dropped sender means the server is gone, which is as done as it gets.
        let _ = self.rx.wait_for(|done| *done).await;
    }
}

/// Coordinator for graceful shutdown.
#[derive(Debug)]
pub struct Shutdown {
    phase: Mutex<ShutdownPhase>,
    gate: ListenerGate,
    tracker: Arc<ConnTracker>,
    drain: Arc<Drain>,
}

impl Shutdown {
    pub fn new(gate: ListenerGate, tracker: Arc<ConnTracker>, drain: Arc<Drain>) -> Self {
        Self {
            phase: Mutex::new(ShutdownPhase::Running),
            gate,
            tracker,
            drain,
        }
    }

    /// Begin shutdown. Returns how many idle connections got the grace deadline.
    ///
    /// A second call returns [`ServeError::AlreadyClosing`] and does nothing.
    pub fn close(&self, disable_keep_alives: impl FnOnce()) -> Result<usize, ServeError> {
        let mut phase = self.lock();
        if *phase != ShutdownPhase::Running {
            return Err(ServeError::AlreadyClosing);
        }

        self.gate.close();
        disable_keep_alives();
        self.tracker.set_closing();

        let grace = self.tracker.grace();
        let deadline = Instant::now() + grace;
        let graced = self
            .tracker
            .snapshot_idle()
            .iter()
            .filter(|conn| conn.apply(deadline))
            .count();

        *phase = ShutdownPhase::Closing;
        drop(phase);

        tracing::info!(
            graced,
            pending = self.drain.pending(),
            grace_ms = grace.as_millis() as u64,
            "Shutdown started"
        );
        metrics::record_grace_deadlines(graced);

        Ok(graced)
    }

    pub fn phase(&self) -> ShutdownPhase {
        match *self.lock() {
            ShutdownPhase::Closing if self.drain.is_complete() => ShutdownPhase::Stopped,
            phase => phase,
        }
    }

    pub fn is_closing(&self) -> bool {
        *self.lock() != ShutdownPhase::Running
    }

    pub fn grace(&self) -> Duration {
        self.tracker.grace()
    }

    fn lock(&self) -> MutexGuard<'_, ShutdownPhase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
