//! Connection identity and the intercepting connection wrapper.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing and the connection table
//! - Detect the first byte of a request on an idle connection
//! - Fire the synthetic `HeaderReceived` transition before the engine sees
//!   the bytes, so the header deadline is in place when parsing starts
//!
//! # Design Decisions
//! - Detection is purely byte-arrival based; any byte counts, including
//!   partial or malformed data
//! - The "reading a request" flag is shared with the tracker, which clears
//!   it when the engine reports the connection idle again

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::net::deadline::{Connection, ReadDeadline};
use crate::net::observer::Transitions;
use crate::net::state::ConnState;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Everything the tracker needs to act on a connection it does not own.
#[derive(Debug, Clone)]
pub struct ConnHandle {
    id: ConnectionId,
    deadline: ReadDeadline,
    reading: Arc<AtomicBool>,
}

impl ConnHandle {
    pub fn new(deadline: ReadDeadline, reading: bool) -> Self {
        Self {
            id: ConnectionId::new(),
            deadline,
            reading: Arc::new(AtomicBool::new(reading)),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn read_deadline(&self) -> &ReadDeadline {
        &self.deadline
    }

    /// Whether bytes of the current request have started arriving.
    pub fn is_reading(&self) -> bool {
        self.reading.load(Ordering::Acquire)
    }

    pub(crate) fn set_reading(&self, reading: bool) {
        self.reading.store(reading, Ordering::Release);
    }

    /// Flip to reading; true if the connection was not reading before.
    fn begin_request(&self) -> bool {
        !self.reading.swap(true, Ordering::AcqRel)
    }
}

/// A connection that reports `HeaderReceived` on the first byte read while idle.
pub struct TrackedConn<C> {
    inner: C,
    handle: ConnHandle,
    transitions: Arc<Transitions>,
}

impl<C: Connection> TrackedConn<C> {
    /// Wrap `inner`. With `new_as_active` the connection starts out reading,
    /// so its first bytes do not fire `HeaderReceived`.
    pub fn new(inner: C, new_as_active: bool, transitions: Arc<Transitions>) -> Self {
        let handle = ConnHandle::new(inner.read_deadline(), new_as_active);
        Self {
            inner,
            handle,
            transitions,
        }
    }
}

impl<C> TrackedConn<C> {
    pub fn id(&self) -> ConnectionId {
        self.handle.id
    }

    pub fn handle(&self) -> &ConnHandle {
        &self.handle
    }
}

impl<C> std::fmt::Debug for TrackedConn<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedConn")
            .field("id", &self.handle.id)
            .field("reading", &self.handle.is_reading())
            .finish()
    }
}

impl<C> AsyncRead for TrackedConn<C>
where
    C: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        if buf.filled().len() > before && this.handle.begin_request() {
            this.transitions
                .notify(&this.handle, ConnState::HeaderReceived);
        }
        Poll::Ready(Ok(()))
    }
}

impl<C> AsyncWrite for TrackedConn<C>
where
    C: AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
