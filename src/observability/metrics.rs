//! Metrics collection and exposition.
//!
//! # Metrics
//! - `overlay_connections_accepted_total` (counter): accepted connections
//! - `overlay_connections_open` (gauge): connections not yet closed or hijacked
//! - `overlay_transitions_total` (counter): state transitions, labelled by `state`
//! - `overlay_grace_deadlines_total` (counter): idle connections graced at close
//!
//! Recording is a no-op until a recorder is installed, so library users who
//! never call [`init_metrics`] pay only for the macro lookups.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::net::state::ConnState;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(error) => tracing::error!(address = %addr, error = %error, "Failed to install metrics exporter"),
    }
}

pub fn record_accept() {
    metrics::counter!("overlay_connections_accepted_total").increment(1);
}

pub fn record_transition(state: ConnState) {
    metrics::counter!("overlay_transitions_total", "state" => state.as_str()).increment(1);
}

pub fn set_open_connections(open: usize) {
    metrics::gauge!("overlay_connections_open").set(open as f64);
}

pub fn record_grace_deadlines(graced: usize) {
    metrics::counter!("overlay_grace_deadlines_total").increment(graced as u64);
}
