//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the upgrade handler on every path
//! - Wire up middleware (request ID, tracing)
//! - Serve Prometheus metrics on the same listener
//! - Apply route table updates from the config watcher
//! - Cancel and drain sessions on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::backend::{H2cConnector, StreamConnector};
use crate::bridge::{BridgeSettings, SessionTracker};
use crate::config::{BridgeConfig, SessionConfig};
use crate::http::websocket::ws_handler;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::{EndpointResolver, RouteTable, SharedRoutes};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<dyn EndpointResolver>,
    pub connector: Arc<dyn StreamConnector>,
    pub settings: BridgeSettings,
    pub session: SessionConfig,
    pub tracker: SessionTracker,
    /// Free session slots; an upgrade needs one.
    pub slots: Arc<Semaphore>,
    /// Parent of every session's lifecycle token.
    pub sessions: CancellationToken,
}

/// WebSocket bridge server.
pub struct BridgeServer {
    router: Router,
    routes: Arc<SharedRoutes>,
    tracker: SessionTracker,
    sessions: CancellationToken,
    drain_timeout: Duration,
}

impl BridgeServer {
    /// Create a server that opens backend streams over HTTP/2 cleartext.
    pub fn new(config: BridgeConfig) -> Self {
        let connector = Arc::new(H2cConnector::new(&config.backend));
        Self::with_connector(config, connector)
    }

    /// Create a server with a custom backend connector.
    pub fn with_connector(config: BridgeConfig, connector: Arc<dyn StreamConnector>) -> Self {
        let routes = Arc::new(SharedRoutes::new(RouteTable::from_config(&config.routes)));
        let tracker = SessionTracker::new();
        let sessions = CancellationToken::new();

        let state = AppState {
            resolver: Arc::clone(&routes) as Arc<dyn EndpointResolver>,
            connector,
            settings: BridgeSettings::from_config(&config),
            session: config.session.clone(),
            tracker: tracker.clone(),
            slots: Arc::new(Semaphore::new(config.listener.max_sessions)),
            sessions: sessions.clone(),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            routes,
            tracker,
            sessions,
            drain_timeout: Duration::from_secs(config.shutdown.drain_timeout_secs),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &BridgeConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/", any(ws_handler))
            .route("/{*path}", any(ws_handler));

        if config.observability.metrics_enabled {
            match metrics::init_metrics() {
                Some(handle) => {
                    router = router.route(
                        &config.observability.metrics_path,
                        get(move || std::future::ready(handle.render())),
                    );
                }
                None => tracing::warn!("Metrics endpoint disabled: no recorder available"),
            }
        }

        router.with_state(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    /// Route table in use; replacing it affects sessions that have not yet resolved.
    pub fn routes(&self) -> Arc<SharedRoutes> {
        Arc::clone(&self.routes)
    }

    pub fn tracker(&self) -> SessionTracker {
        self.tracker.clone()
    }

    /// Run the server until `shutdown` fires, then cancel and drain sessions.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<BridgeConfig>,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.routes.current().len(),
            "Bridge server starting"
        );

        let routes = Arc::clone(&self.routes);
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                routes.replace(RouteTable::from_config(&config.routes));
            }
        });

        let sessions = self.sessions.clone();
        let signal = shutdown.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                signal.wait().await;
                tracing::info!("Shutdown signal received, closing sessions");
                sessions.cancel();
            })
            .await?;

        reloader.abort();
        self.sessions.cancel();

        let remaining = self.tracker.active_count();
        if remaining > 0 {
            tracing::info!(sessions = remaining, "Draining sessions");
        }
        if !self.tracker.wait_for_drain(self.drain_timeout).await {
            tracing::warn!(
                sessions = self.tracker.active_count(),
                timeout_secs = self.drain_timeout.as_secs(),
                "Drain timeout expired, abandoning sessions"
            );
        }

        tracing::info!("Bridge server stopped");
        Ok(())
    }
}
