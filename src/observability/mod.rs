//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape of the metrics path on the main listener
//! ```
//!
//! # Design Decisions
//! - Every session logs inside a `session` span carrying its ID
//! - Metrics are cheap (atomic increments) and recorded even with no recorder
//! - The recorder is installed once per process

pub mod logging;
pub mod metrics;
