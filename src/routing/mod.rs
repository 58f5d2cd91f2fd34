//! Routing subsystem: decides which backend endpoint a session talks to.
//!
//! # Data Flow
//! ```text
//! Upgrade request head (host, path, query)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: Endpoint or NotFound
//!
//! Route Compilation (at startup and on reload):
//!     RouteConfig[]
//!     → Sort by priority
//!     → Compile matchers
//!     → Freeze as immutable RouteTable
//!     → Swap into SharedRoutes
//! ```
//!
//! # Design Decisions
//! - Resolution is a pure function of the request head
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by priority)
//! - Reloads swap whole tables; a session keeps the endpoint it resolved

pub mod matcher;
pub mod router;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::{Request, Uri};

pub use router::{Route, RouteTable};

/// Resolved backend address for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(Uri);

impl Endpoint {
    pub(crate) fn from_uri(uri: Uri) -> Self {
        Self(uri)
    }

    pub fn uri(&self) -> &Uri {
        &self.0
    }

    pub fn into_uri(self) -> Uri {
        self.0
    }
}

impl FromStr for Endpoint {
    type Err = ResolveError;

    /// Parse an absolute `http://` URI.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uri: Uri = s
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| ResolveError::InvalidEndpoint(format!("{s}: {e}")))?;
        if uri.scheme_str() != Some("http") || uri.authority().is_none() {
            return Err(ResolveError::InvalidEndpoint(format!(
                "{s}: expected an absolute http URI"
            )));
        }
        Ok(Self(uri))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why an endpoint could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no route matches {path}")]
    NotFound { path: String },

    #[error("invalid endpoint {0}")]
    InvalidEndpoint(String),
}

/// Maps an inbound upgrade request to the backend endpoint it should reach.
///
/// Implementations must be pure: no side effects, same answer for the same
/// request head. The bridge calls this once per session.
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self, request: &Request<()>) -> Result<Endpoint, ResolveError>;
}

impl<F> EndpointResolver for F
where
    F: Fn(&Request<()>) -> Result<Endpoint, ResolveError> + Send + Sync,
{
    fn resolve(&self, request: &Request<()>) -> Result<Endpoint, ResolveError> {
        self(request)
    }
}

/// A route table that can be replaced while sessions are running.
#[derive(Debug)]
pub struct SharedRoutes {
    table: ArcSwap<RouteTable>,
}

impl SharedRoutes {
    pub fn new(table: RouteTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    /// Atomically install a new table.
    pub fn replace(&self, table: RouteTable) {
        tracing::info!(routes = table.len(), "Route table replaced");
        self.table.store(Arc::new(table));
    }

    pub fn current(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }
}

impl EndpointResolver for SharedRoutes {
    fn resolve(&self, request: &Request<()>) -> Result<Endpoint, ResolveError> {
        self.table.load().resolve(request)
    }
}
