//! Error definitions for serving and shutdown.

use thiserror::Error;

/// Errors surfaced by the overlay.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The tracking listener was closed by shutdown. `serve` treats this as a
    /// clean stop and never returns it.
    #[error("listener closed by shutdown")]
    ListenerClosed,

    /// `close` was called while the server was already closing.
    #[error("server already closing")]
    AlreadyClosing,

    /// `serve` was called on a server that already has an accept loop.
    #[error("server already serving a listener")]
    AlreadyServing,

    /// The underlying listener failed to accept.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// Transport error outside the accept path (bind, local address).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServeError {
    /// True for conditions that are part of a normal shutdown.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, ServeError::ListenerClosed | ServeError::AlreadyClosing)
    }
}
