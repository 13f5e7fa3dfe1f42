//! Startup orchestration.
//!
//! Binds the configured address, builds the server around the given router
//! and runs it until it is closed (by signal when enabled) and drained.

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::ServeError;
use crate::http::{HttpServer, HyperEngine};
use crate::lifecycle::signals::shutdown_signal;

/// Serve `router` with the overlay until shutdown completes.
pub async fn run(config: ServerConfig, router: Router) -> Result<(), ServeError> {
    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    tracing::info!(
        address = %listener.local_addr()?,
        idle_ms = config.timeouts.idle_ms,
        header_read_ms = config.timeouts.header_read_ms,
        body_read_ms = config.timeouts.body_read_ms,
        grace_ms = config.shutdown.grace_ms,
        "Listening for connections"
    );

    let server = Arc::new(HttpServer::new(HyperEngine::new(router), &config));

    if config.shutdown.close_on_signal {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            shutdown_signal().await;
            if let Err(error) = server.close() {
                tracing::warn!(error = %error, "Close requested twice");
            }
        });
    }

    let (completion, result) = server.serve(listener).await;
    if let Err(error) = &result {
        // Idle connections would otherwise hold the completion open forever.
        tracing::error!(error = %error, "Serving failed, draining open connections");
        if let Err(error) = server.close() {
            tracing::debug!(error = %error, "Server was already closing");
        }
    }
    completion.wait().await;
    result?;

    tracing::info!("Shutdown complete");
    Ok(())
}
