//! Response body tracking.
//!
//! hyper drops a response body once it has been fully written (or abandoned),
//! which is the engine's cue that the connection is idle again.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::{header, HeaderValue, Response};
use hyper::body::{Body, Frame, SizeHint};

use crate::http::engine::{ConnHook, EngineState};

/// Body wrapper reporting `Idle` when dropped.
pub struct IdleOnDrop<B> {
    inner: B,
    hook: Option<ConnHook>,
}

impl<B> IdleOnDrop<B> {
    /// `hook` is `None` for responses after which the connection will not idle
    /// (protocol upgrades).
    pub fn new(inner: B, hook: Option<ConnHook>) -> Self {
        Self { inner, hook }
    }
}

impl<B> Drop for IdleOnDrop<B> {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook.report(EngineState::Idle);
        }
    }
}

impl<B> Body for IdleOnDrop<B>
where
    B: Body + Unpin,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.get_mut().inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Mark a response as the last one on its connection.
pub fn close_after<B>(response: &mut Response<B>) {
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body as AxumBody;

    #[test]
    fn close_after_sets_connection_header() {
        let mut response = Response::new(AxumBody::empty());
        close_after(&mut response);
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }

    #[test]
    fn passes_through_body_metadata() {
        let body = IdleOnDrop::new(AxumBody::from("hello"), None);
        assert_eq!(body.size_hint().exact(), Some(5));
        assert!(!body.is_end_stream());
    }
}
