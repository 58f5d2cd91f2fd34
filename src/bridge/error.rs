//! Session error taxonomy.

use std::fmt;
use std::time::Duration;

use crate::backend::BackendError;
use crate::bridge::tracker::SessionId;
use crate::routing::ResolveError;

/// Failures seen while bridging one session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The WebSocket handshake did not complete.
    #[error("upgrade failed: {0}")]
    Upgrade(String),

    #[error("resolving backend endpoint: {0}")]
    Resolve(#[from] ResolveError),

    #[error("connecting to backend: {0}")]
    Connect(String),

    /// The client sent a binary frame.
    #[error("binary messages not supported")]
    BinaryMessage,

    /// Reading from the client failed for a reason other than a close.
    #[error("read websocket message: {0}")]
    ClientRead(String),

    #[error("backend stream: {0}")]
    Transport(String),

    #[error("backend sent invalid UTF-8 at byte {offset}")]
    InvalidUtf8 { offset: u64 },

    #[error("processing message from client: {0}")]
    BackendWrite(String),

    #[error("processing message from client: backend write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The session is shutting down.
    #[error("session closed")]
    Closed,

    #[error("sending message: {0}")]
    ClientWrite(String),
}

/// Coarse classification used for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed or unsupported client traffic. Never fatal.
    ClientProtocol,
    /// Endpoint resolution or backend connection failed.
    Connect,
    /// A transport failed mid-session.
    Transport,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::ClientProtocol => "client_protocol",
            ErrorClass::Connect => "connect",
            ErrorClass::Transport => "transport",
        }
    }

    /// Whether an error of this class ends the session.
    pub fn is_fatal(self) -> bool {
        !matches!(self, ErrorClass::ClientProtocol)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BridgeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BridgeError::BinaryMessage => ErrorClass::ClientProtocol,
            BridgeError::Upgrade(_) | BridgeError::Resolve(_) | BridgeError::Connect(_) => {
                ErrorClass::Connect
            }
            BridgeError::ClientRead(_)
            | BridgeError::Transport(_)
            | BridgeError::InvalidUtf8 { .. }
            | BridgeError::BackendWrite(_)
            | BridgeError::WriteTimeout(_)
            | BridgeError::Closed
            | BridgeError::ClientWrite(_) => ErrorClass::Transport,
        }
    }

    /// Map a backend failure seen while reading the stream.
    pub(crate) fn from_backend_read(err: BackendError) -> Self {
        match err {
            BackendError::Connect(msg) => BridgeError::Connect(msg),
            BackendError::Status(status) => {
                BridgeError::Connect(format!("backend responded with status {status}"))
            }
            BackendError::Transport(msg) => BridgeError::Transport(msg),
            BackendError::Closed => BridgeError::Transport("stream closed".into()),
        }
    }

    /// Map a backend failure seen while writing client payloads.
    pub(crate) fn from_backend_write(err: BackendError) -> Self {
        match err {
            BackendError::Connect(msg) => BridgeError::Connect(msg),
            other => BridgeError::BackendWrite(other.to_string()),
        }
    }
}

/// A recorded failure of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub session_id: SessionId,
    pub class: ErrorClass,
    pub cause: String,
}

impl ErrorEvent {
    pub fn new(session_id: SessionId, err: &BridgeError) -> Self {
        Self {
            session_id,
            class: err.class(),
            cause: err.to_string(),
        }
    }
}
