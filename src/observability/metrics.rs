//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_sessions_total` (counter): sessions started
//! - `bridge_active_sessions` (gauge): live sessions
//! - `bridge_session_duration_seconds` (histogram): session lifetime
//! - `bridge_errors_total{class}` (counter): error events by class
//! - `bridge_messages_total{direction}` / `bridge_bytes_total{direction}`
//! - `bridge_upgrade_failures_total`, `bridge_client_write_failures_total`,
//!   `bridge_sessions_rejected_total` (counters)

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::bridge::ErrorClass;

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder once per process and return its handle.
///
/// Returns `None` if another recorder was installed first.
pub fn init_metrics() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install metrics recorder");
                None
            }
        })
        .clone()
}

/// Which way a payload travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToBackend,
    ToClient,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::ToBackend => "to_backend",
            Direction::ToClient => "to_client",
        }
    }
}

pub fn record_session_opened(active: u64) {
    counter!("bridge_sessions_total").increment(1);
    gauge!("bridge_active_sessions").set(active as f64);
}

pub fn record_session_closed(active: u64, lifetime: Duration) {
    gauge!("bridge_active_sessions").set(active as f64);
    histogram!("bridge_session_duration_seconds").record(lifetime.as_secs_f64());
}

pub fn record_error(class: ErrorClass) {
    counter!("bridge_errors_total", "class" => class.as_str()).increment(1);
}

pub fn record_message(direction: Direction, bytes: usize) {
    counter!("bridge_messages_total", "direction" => direction.as_str()).increment(1);
    counter!("bridge_bytes_total", "direction" => direction.as_str()).increment(bytes as u64);
}

pub fn record_upgrade_failure() {
    counter!("bridge_upgrade_failures_total").increment(1);
}

pub fn record_client_write_failure() {
    counter!("bridge_client_write_failures_total").increment(1);
}

pub fn record_session_rejected() {
    counter!("bridge_sessions_rejected_total").increment(1);
}
