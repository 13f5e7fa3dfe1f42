//! Read deadlines for async byte streams.
//!
//! # Responsibilities
//! - Give any tokio stream a movable read deadline
//! - Let other tasks move the deadline without the reader's cooperation
//! - Surface an expired deadline as an ordinary `TimedOut` I/O error
//!
//! # Design Decisions
//! - The deadline lives in a shared handle (`ReadDeadline`); the stream only
//!   keeps a timer armed to whatever the handle currently says
//! - Moving the deadline wakes a blocked reader so it re-arms its timer
//! - Stamped writes make concurrent writers converge on the newest decision

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::task::AtomicWaker;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

/// A byte stream whose reads can be bounded by a deadline set from anywhere.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Handle controlling this connection's read deadline.
    fn read_deadline(&self) -> ReadDeadline;
}

#[derive(Debug, Default)]
struct Slot {
    at: Option<Instant>,
    stamp: u64,
}

#[derive(Debug, Default)]
struct Shared {
    slot: Mutex<Slot>,
    waker: AtomicWaker,
}

/// Shared, cloneable read deadline.
#[derive(Debug, Clone, Default)]
pub struct ReadDeadline {
    shared: Arc<Shared>,
}

impl ReadDeadline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deadline unconditionally.
    pub fn set(&self, at: Instant) {
        self.slot().at = Some(at);
        self.shared.waker.wake();
    }

    /// Remove the deadline; reads block indefinitely again.
    pub fn clear(&self) {
        self.slot().at = None;
        self.shared.waker.wake();
    }

    /// Current deadline, if any.
    pub fn get(&self) -> Option<Instant> {
        self.slot().at
    }

    /// Set the deadline only if `stamp` is newer than the last stamped write.
    ///
    /// Returns whether the write was applied.
    pub fn set_stamped(&self, stamp: u64, at: Instant) -> bool {
        {
            let mut slot = self.slot();
            if stamp <= slot.stamp {
                return false;
            }
            slot.stamp = stamp;
            slot.at = Some(at);
        }
        self.shared.waker.wake();
        true
    }

    /// Remove the deadline only if `stamp` is newer than the last stamped write.
    pub fn clear_stamped(&self, stamp: u64) -> bool {
        {
            let mut slot = self.slot();
            if stamp <= slot.stamp {
                return false;
            }
            slot.stamp = stamp;
            slot.at = None;
        }
        self.shared.waker.wake();
        true
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.shared.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Adds a [`ReadDeadline`] to a stream.
#[derive(Debug)]
pub struct DeadlineStream<S> {
    inner: S,
    deadline: ReadDeadline,
    timer: Option<Pin<Box<Sleep>>>,
    armed: Option<Instant>,
}

impl<S> DeadlineStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            deadline: ReadDeadline::new(),
            timer: None,
            armed: None,
        }
    }

    /// Ready once the current deadline has passed.
    fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        // Register first so a concurrent `set` between the load and the
        // timer poll still wakes us.
        self.deadline.shared.waker.register(cx.waker());

        let Some(at) = self.deadline.get() else {
            self.armed = None;
            return Poll::Pending;
        };
        if Instant::now() >= at {
            return Poll::Ready(());
        }

        if self.armed != Some(at) {
            let wake_at = tokio::time::Instant::from_std(at);
            match self.timer.as_mut() {
                Some(timer) => timer.as_mut().reset(wake_at),
                None => self.timer = Some(Box::pin(tokio::time::sleep_until(wake_at))),
            }
            self.armed = Some(at);
        }

        match self.timer.as_mut() {
            Some(timer) => timer.as_mut().poll(cx),
            None => Poll::Pending,
        }
    }
}

fn deadline_exceeded() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "read deadline exceeded")
}

impl<S> AsyncRead for DeadlineStream<S>
where
    S: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.poll_expired(cx).is_ready() {
            return Poll::Ready(Err(deadline_exceeded()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S> AsyncWrite for DeadlineStream<S>
where
    S: AsyncWrite + Unpin,
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

impl<S> Connection for DeadlineStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn read_deadline(&self) -> ReadDeadline {
        self.deadline.clone()
    }
}
