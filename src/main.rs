//! conn-overlay demo server.
//!
//! Serves a small axum router through the connection-lifecycle overlay:
//!
//! ```text
//!     client ──▶ TcpListener ──▶ TrackingListener ──▶ TrackedConn
//!                                                        │
//!                       ConnTracker ◀── state reports ── HyperEngine ──▶ Router
//!                            │
//!                   read deadlines per state, grace on close
//! ```
//!
//! `Ctrl+C` / `SIGTERM` closes the server: idle keep-alive connections are
//! dropped after the grace period, in-flight requests finish.

use std::path::PathBuf;
use std::time::Duration;

use axum::{routing::get, routing::post, Router};
use clap::Parser;
use tower_http::trace::TraceLayer;

use conn_overlay::config::{load_config, validate_config, ServerConfig};
use conn_overlay::lifecycle::startup;
use conn_overlay::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "conn-overlay")]
#[command(about = "HTTP server with per-state connection timeouts and graceful shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        if let Err(errors) = validate_config(&config) {
            for error in &errors {
                eprintln!("invalid configuration: {error}");
            }
            return Err("invalid configuration".into());
        }
    }

    logging::init_logging(&config.observability);
    tracing::info!("conn-overlay v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    startup::run(config, demo_router()).await?;
    Ok(())
}

fn demo_router() -> Router {
    Router::new()
        .route("/", get(|| async { "hello\n" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "done\n"
            }),
        )
        .route("/echo", post(|body: String| async move { body }))
        .layer(TraceLayer::new_for_http())
}
