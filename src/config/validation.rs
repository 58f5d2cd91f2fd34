//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check route integrity (unique names, absolute `http` backends)
//! - Validate value ranges (timeouts > 0, capacities > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Uri;

use crate::config::schema::BridgeConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("route at index {0} has an empty name")]
    EmptyRouteName(usize),

    #[error("route name {0:?} is used more than once")]
    DuplicateRoute(String),

    #[error("route {route:?}: backend {backend:?} is not an absolute http URI")]
    Backend { route: String, backend: String },

    #[error("route {0:?}: path_prefix must start with '/'")]
    PathPrefix(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("observability.metrics_path must be an absolute path other than '/'")]
    MetricsPath,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let mut names = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if route.name.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteName(index));
        } else if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }

        if !is_http_uri(&route.backend) {
            errors.push(ValidationError::Backend {
                route: route.name.clone(),
                backend: route.backend.clone(),
            });
        }

        if let Some(prefix) = &route.path_prefix {
            if !prefix.starts_with('/') {
                errors.push(ValidationError::PathPrefix(route.name.clone()));
            }
        }
    }

    let non_zero = [
        ("listener.max_sessions", config.listener.max_sessions as u64),
        ("backend.connect_timeout_ms", config.backend.connect_timeout_ms),
        ("backend.write_timeout_ms", config.backend.write_timeout_ms),
        ("backend.body_buffer", config.backend.body_buffer as u64),
        ("session.outbound_capacity", config.session.outbound_capacity as u64),
        ("session.max_message_size", config.session.max_message_size as u64),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    let metrics_path = config.observability.metrics_path.as_str();
    if config.observability.metrics_enabled && (!metrics_path.starts_with('/') || metrics_path == "/") {
        errors.push(ValidationError::MetricsPath);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_uri(raw: &str) -> bool {
    match raw.parse::<Uri>() {
        Ok(uri) => uri.scheme_str() == Some("http") && uri.authority().is_some(),
        Err(_) => false,
    }
}
