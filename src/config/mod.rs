//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!     → shared by the server and every session
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the route table atomically
//!     → new sessions resolve against the new routes
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only routes are hot-reloaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BackendConfig, BridgeConfig, ListenerConfig, LogFormat, ObservabilityConfig, RouteConfig,
    SessionConfig, ShutdownConfig,
};
