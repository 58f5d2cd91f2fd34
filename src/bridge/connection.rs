//! Per-session bridging engine.
//!
//! # Responsibilities
//! - Resolve the endpoint and open the backend stream, once, on first use
//! - Write client payloads onto the backend stream
//! - Pump backend chunks into the outbound channel as text payloads
//! - Funnel every failure through `event_error`
//! - Tear the session down exactly once
//!
//! # Ownership
//! ```text
//!   client-read task ──from_client──▶ writer ──▶ backend
//!   backend ──▶ reader ──backend pump──▶ outbound channel ──▶ write pump
//! ```
//! The writer has one user (the client-read task) and the reader is moved
//! into the backend pump, so neither needs more than a hand-off lock.
//! The outbound sender lives only inside the backend pump; the channel
//! closes when that task ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use axum::http::Request;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::backend::{BackendReader, BackendWriter, StreamConnector};
use crate::bridge::state::{Lifecycle, SessionState, Transition};
use crate::bridge::tracker::SessionId;
use crate::bridge::utf8::Utf8Chunker;
use crate::bridge::{BridgeError, ErrorEvent};
use crate::config::BridgeConfig;
use crate::observability::metrics::{self, Direction};
use crate::routing::{Endpoint, EndpointResolver};

/// Tunables for one session.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Capacity of the backend → client channel.
    pub outbound_capacity: usize,
    /// Upper bound on a single backend write.
    pub write_timeout: Duration,
}

impl BridgeSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            outbound_capacity: config.session.outbound_capacity.max(1),
            write_timeout: config.backend.write_timeout(),
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

/// One client session bridged to one backend stream.
pub struct BridgeConnection {
    id: SessionId,
    request: Request<()>,
    resolver: Arc<dyn EndpointResolver>,
    connector: Arc<dyn StreamConnector>,
    settings: BridgeSettings,
    token: CancellationToken,
    lifecycle: Lifecycle,

    connected: OnceCell<Result<(), BridgeError>>,
    endpoint: OnceLock<Endpoint>,
    reader: Mutex<Option<BackendReader>>,
    writer: tokio::sync::Mutex<Option<BackendWriter>>,

    outbound_started: AtomicBool,
    fatal_reported: AtomicBool,
    errors: Mutex<Vec<ErrorEvent>>,
}

impl BridgeConnection {
    /// Create a session. Nothing touches the backend until first use.
    ///
    /// `token` is the session's lifecycle; cancelling it (directly or via a
    /// parent) tears the session down.
    pub fn new(
        id: SessionId,
        request: Request<()>,
        resolver: Arc<dyn EndpointResolver>,
        connector: Arc<dyn StreamConnector>,
        settings: BridgeSettings,
        token: CancellationToken,
    ) -> Self {
        Self {
            id,
            request,
            resolver,
            connector,
            settings,
            token,
            lifecycle: Lifecycle::new(),
            connected: OnceCell::new(),
            endpoint: OnceLock::new(),
            reader: Mutex::new(None),
            writer: tokio::sync::Mutex::new(None),
            outbound_started: AtomicBool::new(false),
            fatal_reported: AtomicBool::new(false),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.get()
    }

    /// The endpoint this session resolved, once it has.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.get()
    }

    /// Error events recorded so far.
    pub fn errors(&self) -> Vec<ErrorEvent> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Completes once the session's lifecycle token is cancelled.
    pub async fn closed(&self) {
        self.token.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Write one client payload onto the backend stream.
    ///
    /// Must only be called from the session's client-read task.
    pub async fn from_client(&self, payload: Bytes) -> Result<(), BridgeError> {
        if self.token.is_cancelled() {
            return Err(BridgeError::Closed);
        }
        self.ensure_connected().await?;

        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(BridgeError::Closed);
        };

        let len = payload.len();
        let write_timeout = self.settings.write_timeout;
        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(BridgeError::Closed),
            sent = tokio::time::timeout(write_timeout, writer.send(payload)) => match sent {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(BridgeError::from_backend_write(e)),
                Err(_) => Err(BridgeError::WriteTimeout(write_timeout)),
            },
        };

        match &result {
            Ok(()) => metrics::record_message(Direction::ToBackend, len),
            Err(_) if self.token.is_cancelled() => {
                // close() could not take the writer while we held it.
                guard.take();
            }
            Err(_) => {}
        }
        result
    }

    /// Start the backend pump and return the outbound payload channel.
    ///
    /// The channel closes when the backend stream ends, fails, or the
    /// session is cancelled. Only the first call starts a pump; later calls
    /// get a receiver that is already closed.
    pub fn to_client(self: &Arc<Self>) -> mpsc::Receiver<String> {
        let (outbound, rx) = mpsc::channel(self.settings.outbound_capacity);

        if self.outbound_started.swap(true, Ordering::SeqCst) {
            tracing::debug!(session_id = %self.id, "Backend pump already running");
            return rx;
        }

        let bridge = Arc::clone(self);
        tokio::spawn(async move { bridge.pump_backend(outbound).await }.in_current_span());
        rx
    }

    /// Report a failure. Never blocks.
    ///
    /// Client protocol errors are recorded and the session carries on. Any
    /// other error closes the session; only the first of those is recorded.
    pub fn event_error(&self, err: BridgeError) {
        let class = err.class();

        if !class.is_fatal() {
            tracing::warn!(session_id = %self.id, class = %class, error = %err, "Client protocol error");
            metrics::record_error(class);
            self.record(&err);
            return;
        }

        if err == BridgeError::Closed && self.token.is_cancelled() {
            tracing::trace!(session_id = %self.id, "Ignoring error from closing session");
            self.close();
            return;
        }

        if !self.fatal_reported.swap(true, Ordering::SeqCst) {
            tracing::error!(session_id = %self.id, class = %class, error = %err, "Session error");
            metrics::record_error(class);
            self.record(&err);
        } else {
            tracing::debug!(session_id = %self.id, class = %class, error = %err, "Further session error");
        }

        self.close();
    }

    /// Tear the session down. Idempotent and safe from any task.
    pub fn close(&self) {
        if !self.lifecycle.apply(Transition::Close) {
            return;
        }
        tracing::debug!(session_id = %self.id, "Closing session");

        self.token.cancel();
        self.release_backend();
        self.lifecycle.apply(Transition::Released);
    }

    fn record(&self, err: &BridgeError) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ErrorEvent::new(self.id, err));
    }

    /// Drop whichever backend halves nobody is using right now.
    fn release_backend(&self) {
        self.reader.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }

    async fn ensure_connected(&self) -> Result<(), BridgeError> {
        self.connected.get_or_init(|| self.connect()).await.clone()
    }

    async fn connect(&self) -> Result<(), BridgeError> {
        if !self.lifecycle.apply(Transition::Connect) {
            return Err(BridgeError::Closed);
        }

        let endpoint = match self.resolver.resolve(&self.request) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                let err = BridgeError::from(e);
                self.event_error(err.clone());
                return Err(err);
            }
        };
        tracing::debug!(session_id = %self.id, endpoint = %endpoint, "Opening backend stream");

        let opened = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(BridgeError::Closed),
            opened = self.connector.open(&endpoint) => opened,
        };
        let _ = self.endpoint.set(endpoint);

        let (reader, writer) = match opened {
            Ok(stream) => stream.into_split(),
            Err(e) => {
                let err = BridgeError::Connect(e.to_string());
                self.event_error(err.clone());
                return Err(err);
            }
        };
        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(reader);
        *self.writer.lock().await = Some(writer);

        if !self.lifecycle.apply(Transition::Established) {
            // Closed while the stream was opening.
            self.release_backend();
            return Err(BridgeError::Closed);
        }
        Ok(())
    }

    async fn pump_backend(&self, outbound: mpsc::Sender<String>) {
        if self.ensure_connected().await.is_err() {
            self.close();
            return;
        }

        let reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(mut reader) = reader else {
            return;
        };

        let mut chunker = Utf8Chunker::new();
        let outcome = loop {
            let chunk = tokio::select! {
                biased;
                _ = self.token.cancelled() => break Ok(()),
                chunk = reader.next() => chunk,
            };

            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => break Err(BridgeError::from_backend_read(e)),
                None => break chunker.finish(),
            };

            let text = match chunker.push(&bytes) {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(e) => break Err(e),
            };

            let len = text.len();
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break Ok(()),
                sent = outbound.send(text) => {
                    if sent.is_err() {
                        break Ok(());
                    }
                }
            }
            metrics::record_message(Direction::ToClient, len);
        };

        drop(reader);
        drop(outbound);

        match outcome {
            Ok(()) => {
                tracing::debug!(session_id = %self.id, "Backend stream finished");
                self.close();
            }
            Err(err) => self.event_error(err),
        }
    }
}

impl std::fmt::Debug for BridgeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConnection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("endpoint", &self.endpoint.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendStream};
    use crate::bridge::ErrorClass;
    use crate::routing::ResolveError;
    use async_trait::async_trait;
    use futures_util::stream;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    /// Hands each opened stream's far end to the test.
    struct DuplexConnector {
        peers: mpsc::UnboundedSender<DuplexStream>,
        opens: AtomicUsize,
    }

    impl DuplexConnector {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
            let (peers, rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    peers,
                    opens: AtomicUsize::new(0),
                }),
                rx,
            )
        }
    }

    #[async_trait]
    impl StreamConnector for DuplexConnector {
        async fn open(&self, _endpoint: &Endpoint) -> Result<BackendStream, BackendError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let (local, remote) = tokio::io::duplex(4096);
            let _ = self.peers.send(remote);
            Ok(BackendStream::from_io(local))
        }
    }

    /// Serves a scripted read half and a write half that never completes.
    struct ScriptedConnector {
        chunks: Mutex<Option<Vec<Result<Bytes, BackendError>>>>,
    }

    #[async_trait]
    impl StreamConnector for ScriptedConnector {
        async fn open(&self, _endpoint: &Endpoint) -> Result<BackendStream, BackendError> {
            let chunks = self.chunks.lock().unwrap().take().unwrap_or_default();
            let writer = futures_util::sink::unfold((), |(), _chunk: Bytes| async {
                futures_util::future::pending::<Result<(), BackendError>>().await
            });
            Ok(BackendStream::new(stream::iter(chunks), writer))
        }
    }

    fn fixed_resolver() -> Arc<dyn EndpointResolver> {
        Arc::new(|_: &Request<()>| "http://backend:9000/stream".parse::<Endpoint>())
    }

    fn bridge_with(
        resolver: Arc<dyn EndpointResolver>,
        connector: Arc<dyn StreamConnector>,
        token: CancellationToken,
    ) -> Arc<BridgeConnection> {
        let request = Request::builder().uri("/ws").body(()).unwrap();
        Arc::new(BridgeConnection::new(
            SessionId::new(),
            request,
            resolver,
            connector,
            BridgeSettings {
                outbound_capacity: 4,
                write_timeout: Duration::from_millis(200),
            },
            token,
        ))
    }

    async fn wait_for_state(bridge: &BridgeConnection, state: SessionState) {
        timeout(WAIT, async {
            while bridge.state() != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("session stuck in {}", bridge.state()));
    }

    #[tokio::test]
    async fn client_payloads_reach_backend_in_order() {
        let (connector, mut peers) = DuplexConnector::new();
        let bridge = bridge_with(fixed_resolver(), connector.clone(), CancellationToken::new());

        for part in ["a", "bc", "def"] {
            bridge.from_client(Bytes::from(part)).await.unwrap();
        }

        let mut peer = peers.recv().await.unwrap();
        let mut buf = [0u8; 6];
        timeout(WAIT, peer.read_exact(&mut buf)).await.unwrap().unwrap();
        assert_eq!(&buf, b"abcdef");
        assert_eq!(bridge.state(), SessionState::Active);
        assert_eq!(connector.opens.load(Ordering::SeqCst), 1);
        assert_eq!(
            bridge.endpoint().map(ToString::to_string).as_deref(),
            Some("http://backend:9000/stream")
        );
    }

    #[tokio::test]
    async fn backend_bytes_become_outbound_messages() {
        let (connector, mut peers) = DuplexConnector::new();
        let bridge = bridge_with(fixed_resolver(), connector, CancellationToken::new());

        let mut outbound = bridge.to_client();
        let mut peer = peers.recv().await.unwrap();

        peer.write_all(b"pong").await.unwrap();
        assert_eq!(timeout(WAIT, outbound.recv()).await.unwrap().as_deref(), Some("pong"));

        // A character split across writes arrives whole.
        let euro = "€".as_bytes();
        peer.write_all(&euro[..1]).await.unwrap();
        peer.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        peer.write_all(&euro[1..]).await.unwrap();
        assert_eq!(timeout(WAIT, outbound.recv()).await.unwrap().as_deref(), Some("€"));

        // Backend EOF closes the channel and the session.
        drop(peer);
        assert_eq!(timeout(WAIT, outbound.recv()).await.unwrap(), None);
        wait_for_state(&bridge, SessionState::Closed).await;
        assert!(bridge.errors().is_empty());
    }

    #[tokio::test]
    async fn unresolvable_request_never_opens() {
        let resolver: Arc<dyn EndpointResolver> =
            Arc::new(|req: &Request<()>| -> Result<Endpoint, ResolveError> {
                Err(ResolveError::NotFound {
                    path: req.uri().path().to_string(),
                })
            });
        let (connector, _peers) = DuplexConnector::new();
        let bridge = bridge_with(resolver, connector.clone(), CancellationToken::new());

        let mut outbound = bridge.to_client();
        assert_eq!(timeout(WAIT, outbound.recv()).await.unwrap(), None);

        let err = bridge.from_client(Bytes::from("hello")).await.unwrap_err();
        bridge.event_error(err);

        wait_for_state(&bridge, SessionState::Closed).await;
        assert_eq!(connector.opens.load(Ordering::SeqCst), 0);

        let errors = bridge.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].class, ErrorClass::Connect);
        assert!(errors[0].cause.contains("no route matches /ws"));
    }

    #[tokio::test]
    async fn binary_message_error_is_not_fatal() {
        let (connector, mut peers) = DuplexConnector::new();
        let bridge = bridge_with(fixed_resolver(), connector, CancellationToken::new());

        bridge.from_client(Bytes::from("a")).await.unwrap();
        bridge.event_error(BridgeError::BinaryMessage);
        assert_eq!(bridge.state(), SessionState::Active);
        assert!(!bridge.is_closed());

        bridge.from_client(Bytes::from("hello")).await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        let mut buf = [0u8; 6];
        timeout(WAIT, peer.read_exact(&mut buf)).await.unwrap().unwrap();
        assert_eq!(&buf, b"ahello");

        let errors = bridge.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].class, ErrorClass::ClientProtocol);
        assert_eq!(errors[0].cause, "binary messages not supported");
    }

    #[tokio::test]
    async fn parent_cancellation_stops_idle_pump() {
        let parent = CancellationToken::new();
        let (connector, mut peers) = DuplexConnector::new();
        let bridge = bridge_with(fixed_resolver(), connector, parent.child_token());

        let mut outbound = bridge.to_client();
        let _peer = peers.recv().await.unwrap();
        wait_for_state(&bridge, SessionState::Active).await;

        parent.cancel();
        assert_eq!(timeout(WAIT, outbound.recv()).await.unwrap(), None);
        timeout(WAIT, bridge.closed()).await.unwrap();
        wait_for_state(&bridge, SessionState::Closed).await;

        assert_eq!(
            bridge.from_client(Bytes::from("late")).await,
            Err(BridgeError::Closed)
        );
        assert!(bridge.errors().is_empty());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_concurrent() {
        let (connector, mut peers) = DuplexConnector::new();
        let bridge = bridge_with(fixed_resolver(), connector.clone(), CancellationToken::new());
        bridge.from_client(Bytes::from("x")).await.unwrap();
        let mut peer = peers.recv().await.unwrap();

        let a = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.close() }
        });
        let b = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.close() }
        });
        a.await.unwrap();
        b.await.unwrap();
        bridge.close();

        assert_eq!(bridge.state(), SessionState::Closed);
        assert_eq!(connector.opens.load(Ordering::SeqCst), 1);

        // Both halves were released: the backend sees the payload, then EOF.
        let mut seen = Vec::new();
        timeout(WAIT, peer.read_to_end(&mut seen)).await.unwrap().unwrap();
        assert_eq!(seen, b"x");
    }

    #[tokio::test]
    async fn backend_failure_is_one_transport_event() {
        let connector = Arc::new(ScriptedConnector {
            chunks: Mutex::new(Some(vec![
                Ok(Bytes::from("partial")),
                Err(BackendError::Transport("stream reset".into())),
            ])),
        });
        let bridge = bridge_with(fixed_resolver(), connector, CancellationToken::new());

        let mut outbound = bridge.to_client();
        assert_eq!(timeout(WAIT, outbound.recv()).await.unwrap().as_deref(), Some("partial"));
        assert_eq!(timeout(WAIT, outbound.recv()).await.unwrap(), None);
        wait_for_state(&bridge, SessionState::Closed).await;

        // A later failure from the other pump is not recorded again.
        bridge.event_error(BridgeError::ClientRead("reset".into()));

        let errors = bridge.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].class, ErrorClass::Transport);
        assert!(errors[0].cause.contains("stream reset"));
    }

    #[tokio::test]
    async fn stalled_backend_write_fails_fast() {
        let connector = Arc::new(ScriptedConnector {
            chunks: Mutex::new(None),
        });
        let bridge = bridge_with(fixed_resolver(), connector, CancellationToken::new());

        let err = timeout(WAIT, bridge.from_client(Bytes::from("stuck")))
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err, BridgeError::WriteTimeout(Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn second_to_client_is_closed() {
        let (connector, _peers) = DuplexConnector::new();
        let bridge = bridge_with(fixed_resolver(), connector, CancellationToken::new());

        let _first = bridge.to_client();
        let mut second = bridge.to_client();
        assert_eq!(timeout(WAIT, second.recv()).await.unwrap(), None);
    }
}
