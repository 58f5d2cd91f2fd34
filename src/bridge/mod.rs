//! Bridging engine: one WebSocket session ⇄ one backend byte stream.
//!
//! # Data Flow
//! ```text
//! client text frame ──from_client──▶ BridgeConnection ──▶ backend stream
//! backend stream ──▶ backend pump ──to_client channel──▶ client text frame
//! any failure ──▶ event_error ──▶ log + metrics + close
//! ```
//!
//! # Design Decisions
//! - Explicit session state machine (state.rs), applied under one mutex
//! - Backend contact is lazy and happens once (resolve + open)
//! - One cancellation token per session, child of the server's
//! - Teardown is one-shot no matter how many paths request it

pub mod connection;
pub mod error;
pub mod state;
pub mod tracker;
pub mod utf8;

pub use connection::{BridgeConnection, BridgeSettings};
pub use error::{BridgeError, ErrorClass, ErrorEvent};
pub use state::SessionState;
pub use tracker::{SessionGuard, SessionId, SessionTracker};
