//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Cancel sessions → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One root cancellation token; every session holds a child of it
//! - Shutdown has timeout: sessions still alive after the deadline are abandoned

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
