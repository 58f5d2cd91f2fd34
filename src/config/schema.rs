//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener configuration (bind address, session limit).
    pub listener: ListenerConfig,

    /// Route definitions mapping inbound requests to backend endpoints.
    pub routes: Vec<RouteConfig>,

    /// Backend stream client settings.
    pub backend: BackendConfig,

    /// Per-session settings.
    pub session: SessionConfig,

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

    /// Maximum concurrent sessions. Upgrades beyond this are refused.
    pub max_sessions: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_sessions: 10_000,
        }
    }
}

/// Route configuration mapping requests to a backend endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging.
    pub name: String,

    /// Host header to match (exact match).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Backend base URI (e.g., "http://127.0.0.1:9000/stream").
    pub backend: String,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    /// Append the inbound path and query to the backend URI.
    #[serde(default = "default_forward_path")]
    pub forward_path: bool,

    /// Remove the matched `path_prefix` before appending the path.
    #[serde(default)]
    pub strip_prefix: bool,
}

fn default_forward_path() -> bool {
    true
}

/// Backend stream client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Maximum time a single write to the backend may take.
    pub write_timeout_ms: u64,

    /// Chunks buffered between the session and the HTTP/2 request body.
    pub body_buffer: usize,

    /// Idle pooled connections are dropped after this many seconds.
    pub pool_idle_timeout_secs: u64,
}

impl BackendConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            write_timeout_ms: 10_000,
            body_buffer: 32,
            pool_idle_timeout_secs: 90,
        }
    }
}

/// Per-session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of the backend → client message channel.
    pub outbound_capacity: usize,

    /// Largest message accepted from a client, in bytes.
    pub max_message_size: usize,

    /// WebSocket read buffer size in bytes.
    pub read_buffer_size: usize,

    /// WebSocket write buffer size in bytes.
    pub write_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 32,
            max_message_size: 1024 * 1024,
            read_buffer_size: 1024,
            write_buffer_size: 1024,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for cancelled sessions to finish.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Serve Prometheus metrics on the main listener.
    pub metrics_enabled: bool,

    /// Path the metrics are served on.
    pub metrics_path: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_path: "/metrics".to_string(),
        }
    }
}
