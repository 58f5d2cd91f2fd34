//! Session state machine.
//!
//! ```text
//! Created ──Connect──▶ Connecting ──Established──▶ Active
//!    │                     │                         │
//!    └───────Close─────────┴──────────Close──────────┘
//!                          ▼
//!                       Closing ──Released──▶ Closed
//! ```
//!
//! Transitions are a pure function of (state, event) so the rules can be
//! tested without any I/O. `Lifecycle` applies them under one mutex; a
//! transition that is not allowed from the current state is a no-op, which
//! is what makes teardown one-shot.

use std::sync::{Mutex, PoisonError};

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, no backend contact yet.
    Created,
    /// Resolving the endpoint and opening the backend stream.
    Connecting,
    /// Backend stream open; traffic flows both ways.
    Active,
    /// Teardown started; no new work is accepted.
    Closing,
    /// Terminal.
    Closed,
}

/// Events that move a session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Connect,
    Established,
    Close,
    Released,
}

impl SessionState {
    /// The state reached by applying `transition`, or `None` if it is not
    /// allowed from `self`.
    pub fn next(self, transition: Transition) -> Option<SessionState> {
        use SessionState::*;
        use Transition::*;

        match (self, transition) {
            (Created, Connect) => Some(Connecting),
            (Connecting, Established) => Some(Active),
            (Created | Connecting | Active, Close) => Some(Closing),
            (Closing, Released) => Some(Closed),
            _ => None,
        }
    }

    /// True once teardown has started.
    pub fn is_closing(self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Shared, mutex-guarded session state.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<SessionState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Created),
        }
    }

    pub fn get(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a transition. Returns true if the state changed.
    pub fn apply(&self, transition: Transition) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.next(transition) {
            Some(next) => {
                tracing::trace!(from = %*state, to = %next, "Session state change");
                *state = next;
                true
            }
            None => false,
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
