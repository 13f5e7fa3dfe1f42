//! Listeners.
//!
//! # Responsibilities
//! - Abstract the raw accept source (`Listener`), with a TCP implementation
//! - Wrap every accepted connection for state tracking (`TrackingListener`)
//! - Count accept attempts toward the pending-connection drain
//! - Report accepts cut short by shutdown as `ListenerClosed`
//!
//! # Design Decisions
//! - The pending slot is acquired before accepting, so a shutdown drain check
//!   can never miss an accept that is already in flight
//! - Closing is a shared gate rather than dropping the socket, so `close`
//!   works from any task while the accept loop owns the listener

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::error::ServeError;
use crate::lifecycle::shutdown::Drain;
use crate::net::connection::TrackedConn;
use crate::net::deadline::{Connection, DeadlineStream};
use crate::net::observer::Transitions;
use crate::observability::metrics;

/// A source of connections.
pub trait Listener: Send + 'static {
    type Conn: Connection;
    type Addr: fmt::Display + Send + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Conn, Self::Addr)>> + Send;

    fn local_addr(&self) -> io::Result<Self::Addr>;
}

impl Listener for TcpListener {
    type Conn = DeadlineStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> io::Result<(Self::Conn, Self::Addr)> {
        let (stream, addr) = TcpListener::accept(self).await?;
        Ok((DeadlineStream::new(stream), addr))
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        TcpListener::local_addr(self)
    }
}

/// Shared "listener closed" flag. Closing wakes a pending accept.
#[derive(Debug, Clone)]
pub struct ListenerGate {
    closed: Arc<watch::Sender<bool>>,
}

impl ListenerGate {
    pub fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            closed: Arc::new(closed),
        }
    }

    /// Close the gate. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the gate is closed.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for ListenerGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener decorator that wraps and counts every accepted connection.
pub struct TrackingListener<L> {
    inner: L,
    gate: ListenerGate,
    drain: Arc<Drain>,
    transitions: Arc<Transitions>,
    new_as_active: bool,
}

impl<L: Listener> TrackingListener<L> {
    pub fn new(
        inner: L,
        gate: ListenerGate,
        drain: Arc<Drain>,
        transitions: Arc<Transitions>,
    ) -> Self {
        let new_as_active = transitions.tracker().policy().new_as_active;
        Self {
            inner,
            gate,
            drain,
            transitions,
            new_as_active,
        }
    }

    /// Accept the next connection.
    ///
    /// Fails with [`ServeError::ListenerClosed`] once the gate is closed, and
    /// with [`ServeError::Accept`] for any other accept failure.
    pub async fn accept(&mut self) -> Result<(TrackedConn<L::Conn>, L::Addr), ServeError> {
        self.drain.acquire();

        let accepted = tokio::select! {
            biased;
            _ = self.gate.closed() => Err(ServeError::ListenerClosed),
            result = self.inner.accept() => result.map_err(ServeError::Accept),
        };

        match accepted {
            Ok((conn, addr)) => {
                metrics::record_accept();
                let conn = TrackedConn::new(conn, self.new_as_active, Arc::clone(&self.transitions));
                tracing::debug!(connection_id = %conn.id(), peer_addr = %addr, "Connection accepted");
                Ok((conn, addr))
            }
            Err(error) => {
                self.drain.release();
                if self.gate.is_closed() {
                    Err(ServeError::ListenerClosed)
                } else {
                    Err(error)
                }
            }
        }
    }

    /// Stop accepting; the pending or next `accept` fails with `ListenerClosed`.
    pub fn close(&self) {
        self.gate.close();
    }

    pub fn local_addr(&self) -> io::Result<L::Addr> {
        self.inner.local_addr()
    }
}
