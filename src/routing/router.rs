//! Route lookup and endpoint construction.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for request
//! - Build the backend endpoint for the matched route
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Explicit NotFound rather than silent default

use axum::http::uri::{PathAndQuery, Uri};
use axum::http::Request;

use crate::config::RouteConfig;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};
use crate::routing::{Endpoint, EndpointResolver, ResolveError};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    matcher: AndMatcher,
    backend: Uri,
    forward_path: bool,
    strip_prefix: Option<String>,
}

impl Route {
    /// Compile a route from its configuration.
    pub fn from_config(config: &RouteConfig) -> Result<Self, ResolveError> {
        let backend: Endpoint = config.backend.parse()?;

        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = &config.host {
            matchers.push(Box::new(HostMatcher::new(host.clone())));
        }
        if let Some(prefix) = &config.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix.clone())));
        }

        let strip_prefix = if config.strip_prefix {
            config.path_prefix.clone()
        } else {
            None
        };

        Ok(Self {
            name: config.name.clone(),
            matcher: AndMatcher::new(matchers),
            backend: backend.into_uri(),
            forward_path: config.forward_path,
            strip_prefix,
        })
    }

    pub fn matches(&self, req: &Request<()>) -> bool {
        self.matcher.matches(req)
    }

    /// Build the backend endpoint for a request this route matched.
    pub fn endpoint_for(&self, req: &Request<()>) -> Result<Endpoint, ResolveError> {
        if !self.forward_path {
            return Ok(Endpoint::from_uri(self.backend.clone()));
        }

        let mut rest = req.uri().path();
        if let Some(prefix) = &self.strip_prefix {
            rest = rest.strip_prefix(prefix.as_str()).unwrap_or(rest);
        }

        let mut path_and_query = join_path(self.backend.path(), rest);
        let query: Vec<&str> = [self.backend.query(), req.uri().query()]
            .into_iter()
            .flatten()
            .filter(|q| !q.is_empty())
            .collect();
        if !query.is_empty() {
            path_and_query.push('?');
            path_and_query.push_str(&query.join("&"));
        }

        let path_and_query = PathAndQuery::try_from(path_and_query.as_str())
            .map_err(|e| ResolveError::InvalidEndpoint(e.to_string()))?;

        let mut parts = self.backend.clone().into_parts();
        parts.path_and_query = Some(path_and_query);
        let uri = Uri::from_parts(parts).map_err(|e| ResolveError::InvalidEndpoint(e.to_string()))?;
        Ok(Endpoint::from_uri(uri))
    }
}

fn join_path(base: &str, rest: &str) -> String {
    let mut path = base.trim_end_matches('/').to_string();
    let rest = rest.trim_start_matches('/');
    if !rest.is_empty() {
        path.push('/');
        path.push_str(rest);
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

/// Immutable, priority-ordered set of routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Compile routes from configuration, highest priority first.
    ///
    /// Routes whose backend does not parse are skipped with a warning;
    /// validated configs never contain them.
    pub fn from_config(configs: &[RouteConfig]) -> Self {
        let mut ordered: Vec<&RouteConfig> = configs.iter().collect();
        // Stable sort keeps config order among equal priorities.
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        let routes = ordered
            .into_iter()
            .filter_map(|config| match Route::from_config(config) {
                Ok(route) => Some(route),
                Err(e) => {
                    tracing::warn!(route = %config.name, error = %e, "Skipping invalid route");
                    None
                }
            })
            .collect();

        Self { routes }
    }

    /// Find the first route matching the request.
    pub fn match_request(&self, req: &Request<()>) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(req))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl EndpointResolver for RouteTable {
    fn resolve(&self, request: &Request<()>) -> Result<Endpoint, ResolveError> {
        let route = self
            .match_request(request)
            .ok_or_else(|| ResolveError::NotFound {
                path: request.uri().path().to_string(),
            })?;

        let endpoint = route.endpoint_for(request)?;
        tracing::debug!(route = %route.name, endpoint = %endpoint, "Route matched");
        Ok(endpoint)
    }
}
