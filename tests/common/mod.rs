//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{routing::get, routing::post, Router};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use conn_overlay::config::ServerConfig;
use conn_overlay::{Completion, ConnState, ConnectionId, HttpServer, HyperEngine, ServeError};

/// Allowed deviation between a configured timeout and the observed disconnect.
pub const TOLERANCE: Duration = Duration::from_millis(150);

pub type Events = Arc<Mutex<Vec<(ConnectionId, ConnState)>>>;

pub struct TestServer {
    pub server: Arc<HttpServer<HyperEngine>>,
    pub addr: SocketAddr,
    pub serving: JoinHandle<(Completion, Result<(), ServeError>)>,
    pub events: Events,
}

impl TestServer {
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    /// Wait until `predicate` holds for the tracker, polling briefly.
    pub async fn wait_until(&self, predicate: impl Fn(&HttpServer<HyperEngine>) -> bool) {
        let start = Instant::now();
        while !predicate(&self.server) {
            assert!(
                start.elapsed() < Duration::from_secs(2),
                "condition not reached in time"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Close the server and return the completion handed back by `serve`.
    pub async fn close(self) -> Completion {
        self.server.close().unwrap();
        let (completion, result) = self.serving.await.unwrap();
        result.unwrap();
        completion
    }

    pub fn states(&self) -> Vec<ConnState> {
        self.events.lock().unwrap().iter().map(|(_, s)| *s).collect()
    }
}

pub fn config(idle_ms: u64, header_read_ms: u64, body_read_ms: u64) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.timeouts.idle_ms = idle_ms;
    config.timeouts.header_read_ms = header_read_ms;
    config.timeouts.body_read_ms = body_read_ms;
    config
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                "slow"
            }),
        )
        .route("/echo", post(|body: String| async move { body }))
}

pub async fn start_server(config: ServerConfig) -> TestServer {
    start_server_with(config, router()).await
}

pub async fn start_server_with(config: ServerConfig, router: Router) -> TestServer {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let mut server = HttpServer::new(HyperEngine::new(router), &config);
    let sink = Arc::clone(&events);
    server.observe(move |id, state| sink.lock().unwrap().push((id, state)));

    let server = Arc::new(server);
    let serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve(listener).await }
    });

    TestServer {
        server,
        addr,
        serving,
        events,
    }
}

/// Read until the server closes the connection. Returns how long that took
/// and whatever was received.
pub async fn time_until_closed(stream: &mut TcpStream) -> (Duration, Vec<u8>) {
    let start = Instant::now();
    let mut data = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), async {
        let mut buf = [0u8; 1024];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => return Ok(()),
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    })
    .await;

    match read {
        Ok(result) => result.unwrap(),
        Err(_) => panic!("server never closed the connection"),
    }
    (start.elapsed(), data)
}

pub fn assert_close_to(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= TOLERANCE,
        "closed after {actual:?}, expected about {expected:?}"
    );
}

/// Send one keep-alive request and read its full response.
pub async fn http_get(stream: &mut TcpStream, path: &str) -> String {
    let request = format!("GET {path} HTTP/1.1\r\nHost: test\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    read_response(stream).await
}

/// Read one response with a `Content-Length` body.
pub async fn read_response(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed mid-response");
        data.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&data);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if data.len() >= end + 4 + length {
                return text.into_owned();
            }
        }
    }
}
