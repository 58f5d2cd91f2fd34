//! Backend stream subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint
//!     → client.rs (shared HTTP/2 cleartext client, POST with streaming body)
//!     → stream.rs (BackendStream: independent read and write halves)
//!     → handed to the bridge, which owns both halves for the session
//! ```
//!
//! # Design Decisions
//! - One pooled client per process, injected at construction
//! - The bridge never interprets backend framing; it sees only bytes
//! - Dropping a half closes it, so "closed at most once" follows from ownership

pub mod client;
pub mod stream;

use async_trait::async_trait;
use axum::http::StatusCode;

use crate::routing::Endpoint;

pub use client::H2cConnector;
pub use stream::{BackendReader, BackendStream, BackendWriter};

/// Errors produced by a backend stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The backend answered the stream request with a non-success status.
    #[error("backend responded with status {0}")]
    Status(StatusCode),

    /// The stream failed after it was established.
    #[error("{0}")]
    Transport(String),

    /// The stream no longer accepts writes.
    #[error("stream closed")]
    Closed,
}

impl BackendError {
    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        BackendError::Transport(err.to_string())
    }
}

/// Opens duplex byte streams to backend endpoints.
///
/// The returned stream supports concurrent independent reads and writes.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn open(&self, endpoint: &Endpoint) -> Result<BackendStream, BackendError>;
}
