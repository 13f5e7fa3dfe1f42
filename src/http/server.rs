//! The connection-lifecycle server.
//!
//! # Responsibilities
//! - Run the accept loop over a [`Listener`], wrapping every connection
//! - Hand each connection to the engine on its own task
//! - Route engine state reports through the tracker and registered observers
//! - Coordinate `close()` with the listener, the engine and idle connections
//! - Expose a completion signal for "every accepted connection is gone"
//!
//! # Data Flow
//! ```text
//! Listener::accept
//!     → TrackingListener (pending slot, TrackedConn wrapper)
//!     → tokio::spawn(engine.serve_connection(conn, hook))
//!     → hook.report(state) → ConnTracker → observers
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::ServeError;
use crate::http::engine::{ConnHook, Engine};
use crate::lifecycle::shutdown::{Completion, Drain, Shutdown, ShutdownPhase};
use crate::net::connection::ConnectionId;
use crate::net::listener::{Listener, ListenerGate, TrackingListener};
use crate::net::observer::{StateObserver, Transitions};
use crate::net::state::ConnState;
use crate::net::tracker::ConnTracker;
use crate::resilience::backoff::{is_transient, AcceptBackoff};
use crate::resilience::TimeoutPolicy;

/// Server overlaying idle/header/body timeouts and graceful shutdown on an
/// [`Engine`].
///
/// Share it behind an `Arc` to call [`close`](Self::close) while
/// [`serve`](Self::serve) runs on another task.
pub struct HttpServer<E> {
    engine: Arc<E>,
    tracker: Arc<ConnTracker>,
    drain: Arc<Drain>,
    gate: ListenerGate,
    shutdown: Shutdown,
    observers: Vec<StateObserver>,
    serving: AtomicBool,
}

impl<E: Engine> HttpServer<E> {
    pub fn new(engine: E, config: &ServerConfig) -> Self {
        let policy = TimeoutPolicy::from(&config.timeouts);
        let drain = Arc::new(Drain::new());
        let tracker = Arc::new(ConnTracker::new(
            policy,
            &config.shutdown,
            Arc::clone(&drain),
        ));
        let gate = ListenerGate::new();
        let shutdown = Shutdown::new(gate.clone(), Arc::clone(&tracker), Arc::clone(&drain));

        Self {
            engine: Arc::new(engine),
            tracker,
            drain,
            gate,
            shutdown,
            observers: Vec::new(),
            serving: AtomicBool::new(false),
        }
    }

    /// Register an observer. Observers run after the tracker, in registration
    /// order, and must be registered before [`serve`](Self::serve).
    pub fn observe<F>(&mut self, observer: F) -> &mut Self
    where
        F: Fn(ConnectionId, ConnState) + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Accept and serve connections until the server is closed.
    ///
    /// Returns once the listener stops. The [`Completion`] comes back on every
    /// path and resolves when the last accepted connection has closed or been
    /// hijacked; after an error, connections already accepted keep running.
    /// A non-transient accept failure ends the loop with
    /// [`ServeError::Accept`]. A server serves one listener in its lifetime;
    /// further calls fail with [`ServeError::AlreadyServing`].
    pub async fn serve<L: Listener>(&self, listener: L) -> (Completion, Result<(), ServeError>) {
        if self.serving.swap(true, Ordering::AcqRel) {
            return (self.drain.completion(), Err(ServeError::AlreadyServing));
        }

        let transitions = Arc::new(Transitions::new(
            Arc::clone(&self.tracker),
            self.observers.clone(),
        ));
        let mut listener = TrackingListener::new(
            listener,
            self.gate.clone(),
            Arc::clone(&self.drain),
            Arc::clone(&transitions),
        );

        match listener.local_addr() {
            Ok(addr) => tracing::info!(address = %addr, "HTTP server accepting connections"),
            Err(error) => tracing::warn!(error = %error, "Listener has no local address"),
        }

        let mut backoff = AcceptBackoff::default();
        let result = loop {
            match listener.accept().await {
                Ok((conn, _peer)) => {
                    backoff.reset();
                    let hook = ConnHook::new(conn.handle().clone(), Arc::clone(&transitions));
                    tokio::spawn(self.engine.serve_connection(conn, hook));
                }
                Err(ServeError::Accept(error)) if is_transient(&error) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(error = %error, delay_ms = delay.as_millis() as u64, "Accept failed, retrying");
                    tokio::select! {
                        _ = self.gate.closed() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(ServeError::ListenerClosed) => break Ok(()),
                Err(error) => {
                    tracing::error!(error = %error, "Accept loop stopped");
                    break Err(error);
                }
            }
        };

        self.drain.stop_accepting();
        tracing::info!(pending = self.drain.pending(), "HTTP server stopped accepting");

        (self.drain.completion(), result)
    }

    /// Stop accepting, disable keep-alives and give idle connections the
    /// grace deadline. Connections mid-request finish their request.
    ///
    /// Fails with [`ServeError::AlreadyClosing`] on every call after the first.
    pub fn close(&self) -> Result<(), ServeError> {
        let engine = &self.engine;
        self.shutdown
            .close(|| engine.set_keep_alives_enabled(false))?;

        if !self.serving.load(Ordering::Acquire) {
            // No accept loop will ever report that it stopped.
            self.drain.stop_accepting();
        }
        Ok(())
    }

    /// Resolves once every accepted connection has terminated after close.
    pub fn completion(&self) -> Completion {
        self.drain.completion()
    }

    pub fn phase(&self) -> ShutdownPhase {
        self.shutdown.phase()
    }

    pub fn is_closing(&self) -> bool {
        self.shutdown.is_closing()
    }

    /// Whether `serve` has been called.
    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::Acquire)
    }

    /// Connections currently in the table.
    pub fn open_connections(&self) -> usize {
        self.tracker.len()
    }

    pub fn tracker(&self) -> &Arc<ConnTracker> {
        &self.tracker
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E> std::fmt::Debug for HttpServer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("tracker", &self.tracker)
            .field("shutdown", &self.shutdown)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}
