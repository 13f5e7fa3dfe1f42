//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the overlay.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Per-state read deadlines.
    pub timeouts: TimeoutConfig,

    /// Shutdown behaviour.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Read deadline configuration. A value of zero leaves the deadline untouched
/// when a connection enters the corresponding state.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long a connection may sit idle between requests, in milliseconds.
    pub idle_ms: u64,

    /// Time allowed to receive request headers, measured from the first byte.
    pub header_read_ms: u64,

    /// Time allowed to receive the request body once the handler has started.
    pub body_read_ms: u64,

    /// Treat brand-new connections as if a request were already arriving,
    /// applying the header timeout instead of the idle timeout.
    ///
    /// Not recommended behind a proxy or load balancer that keeps
    /// permanent connections open.
    pub new_as_active: bool,
}

impl TimeoutConfig {
    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn header_read(&self) -> Duration {
        Duration::from_millis(self.header_read_ms)
    }

    pub fn body_read(&self) -> Duration {
        Duration::from_millis(self.body_read_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            idle_ms: 60_000,
            header_read_ms: 10_000,
            body_read_ms: 30_000,
            new_as_active: false,
        }
    }
}

/// What happens to a connection that was idle when shutdown began but starts
/// a request inside its grace window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LateRequests {
    /// The request gets the regular header/body deadlines and may complete.
    #[default]
    Complete,
    /// The connection stays bound to the grace deadline.
    Grace,
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Deadline applied to idle connections when shutdown begins, in milliseconds.
    pub grace_ms: u64,

    /// Policy for requests starting inside the grace window.
    pub late_requests: LateRequests,

    /// Close the server on SIGINT/SIGTERM (used by the binary).
    pub close_on_signal: bool,
}

impl ShutdownConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_ms: 100,
            late_requests: LateRequests::Complete,
            close_on_signal: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [timeouts]
            idle_ms = 2000
            new_as_active = true

            [shutdown]
            late_requests = "grace"
            "#,
        )
        .unwrap();

        assert_eq!(config.timeouts.idle(), Duration::from_secs(2));
        assert_eq!(config.timeouts.header_read_ms, 10_000);
        assert!(config.timeouts.new_as_active);
        assert_eq!(config.shutdown.late_requests, LateRequests::Grace);
        assert_eq!(config.shutdown.grace(), Duration::from_millis(100));
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }
}
