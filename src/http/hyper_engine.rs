//! HTTP/1.1 engine built on hyper and axum.
//!
//! # Responsibilities
//! - Serve one connection with hyper's HTTP/1 connection driver
//! - Dispatch requests to an axum `Router`
//! - Report New / Active / Idle / Hijacked / Closed to the overlay
//! - Drop keep-alive on request
//!
//! # State Reporting
//! ```text
//! New       before the connection is handed to hyper
//! Active    hyper invoked the service: headers fully parsed
//! Idle      hyper dropped the response body: response written
//! Hijacked  a 101 response upgraded the connection out of hyper
//! Closed    the connection future resolved
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::http::{Request, Response, StatusCode};
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tower::ServiceExt;

use crate::http::engine::{ConnHook, Engine, EngineState};
use crate::http::response::{close_after, IdleOnDrop};

/// Engine serving an axum [`Router`] over HTTP/1.1.
#[derive(Clone)]
pub struct HyperEngine {
    router: Router,
    keep_alive: Arc<AtomicBool>,
}

impl HyperEngine {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            keep_alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn keep_alives_enabled(&self) -> bool {
        self.keep_alive.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for HyperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperEngine")
            .field("keep_alive", &self.keep_alives_enabled())
            .finish_non_exhaustive()
    }
}

impl Engine for HyperEngine {
    fn serve_connection<I>(&self, io: I, hook: ConnHook) -> impl Future<Output = ()> + Send + 'static
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let router = self.router.clone();
        let keep_alive = Arc::clone(&self.keep_alive);

        async move {
            hook.report(EngineState::New);

            let upgraded = Arc::new(AtomicBool::new(false));
            let service = {
                let hook = hook.clone();
                let keep_alive = Arc::clone(&keep_alive);
                let upgraded = Arc::clone(&upgraded);
                service_fn(move |request: Request<Incoming>| {
                    let router = router.clone();
                    let hook = hook.clone();
                    let keep_alive = Arc::clone(&keep_alive);
                    let upgraded = Arc::clone(&upgraded);
                    async move {
                        hook.report(EngineState::Active);

                        let mut response = match router.oneshot(request).await {
                            Ok(response) => response,
                            Err(never) => match never {},
                        };

                        let switching = response.status() == StatusCode::SWITCHING_PROTOCOLS;
                        if switching {
                            upgraded.store(true, Ordering::Release);
                        } else if !keep_alive.load(Ordering::Acquire) {
                            close_after(&mut response);
                        }

                        let (parts, body) = response.into_parts();
                        let body = IdleOnDrop::new(body, (!switching).then_some(hook));
                        Ok::<_, Infallible>(Response::from_parts(parts, body))
                    }
                })
            };

            let mut builder = http1::Builder::new();
            builder.keep_alive(keep_alive.load(Ordering::Acquire));

            let result = builder
                .serve_connection(TokioIo::new(io), service)
                .with_upgrades()
                .await;

            if let Err(error) = result {
                // Deadline expiry lands here as an ordinary I/O error.
                tracing::debug!(connection_id = %hook.id(), error = %error, "Connection ended with error");
            }

            let terminal = if upgraded.load(Ordering::Acquire) {
                EngineState::Hijacked
            } else {
                EngineState::Closed
            };
            hook.report(terminal);
        }
    }

    fn set_keep_alives_enabled(&self, enabled: bool) {
        self.keep_alive.store(enabled, Ordering::Release);
        tracing::debug!(enabled, "Keep-alive setting changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::config::ShutdownConfig;
    use crate::lifecycle::shutdown::Drain;
    use crate::net::connection::ConnHandle;
    use crate::net::deadline::ReadDeadline;
    use crate::net::observer::{StateObserver, Transitions};
    use crate::net::state::ConnState;
    use crate::net::tracker::ConnTracker;
    use crate::resilience::TimeoutPolicy;

    fn hook() -> (ConnHook, Arc<Mutex<Vec<ConnState>>>) {
        let drain = Arc::new(Drain::new());
        drain.acquire();
        let tracker = Arc::new(ConnTracker::new(
            TimeoutPolicy::default(),
            &ShutdownConfig::default(),
            drain,
        ));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: StateObserver = Arc::new(move |_, state| sink.lock().unwrap().push(state));
        let transitions = Arc::new(Transitions::new(tracker, vec![observer]));
        (
            ConnHook::new(ConnHandle::new(ReadDeadline::new(), false), transitions),
            seen,
        )
    }

    fn engine() -> HyperEngine {
        HyperEngine::new(Router::new().route("/", get(|| async { "hello" })))
    }

    async fn read_response(client: &mut tokio::io::DuplexStream) -> String {
        let mut buf = vec![0u8; 1024];
        let n = client.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[tokio::test]
    async fn reports_request_lifecycle() {
        let (hook, seen) = hook();
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(engine().serve_connection(server, hook));

        client
            .write_all(b"GET / HTTP/1.1\r\nHost: test\r\n\r\n")
            .await
            .unwrap();
        let response = read_response(&mut client).await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("hello"));

        drop(client);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ConnState::New,
                ConnState::Active,
                ConnState::Idle,
                ConnState::Closed
            ]
        );
    }

    #[tokio::test]
    async fn disabled_keep_alive_closes_after_response() {
        let (hook, seen) = hook();
        let engine = engine();
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(engine.serve_connection(server, hook));

        engine.set_keep_alives_enabled(false);
        assert!(!engine.keep_alives_enabled());

        client
            .write_all(b"GET / HTTP/1.1\r\nHost: test\r\n\r\n")
            .await
            .unwrap();
        let response = read_response(&mut client).await;
        assert!(response.to_ascii_lowercase().contains("connection: close"));

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("server closes the connection")
            .unwrap();
        assert_eq!(seen.lock().unwrap().last(), Some(&ConnState::Closed));
    }
}
