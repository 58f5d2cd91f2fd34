//! WebSocket to HTTP/2 cleartext stream bridge.
//!
//! Every accepted WebSocket session is paired with one streaming HTTP/2
//! request to a backend. Client text messages are written to the request
//! body; the response body is relayed back as text messages.

// Core subsystems
pub mod backend;
pub mod bridge;
pub mod config;
pub mod http;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use bridge::BridgeConnection;
pub use config::BridgeConfig;
pub use http::BridgeServer;
pub use lifecycle::Shutdown;
