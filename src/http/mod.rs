//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, metrics route)
//!     → websocket.rs (admission, upgrade, session pumps)
//!     → bridge (one BridgeConnection per session)
//! ```

pub mod server;
pub mod websocket;

pub use server::{AppState, BridgeServer};
