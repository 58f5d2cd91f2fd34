//! WebSocket session handling.
//!
//! # Responsibilities
//! - Admit upgrade requests against the session limit
//! - Complete the upgrade handshake with the client
//! - Run the two pumps of a session against its `BridgeConnection`
//!
//! # Data Flow
//! ```text
//! Client ── text frames ──▶ read loop ──from_client──▶ Backend stream
//! Client ◀── text frames ── write loop ◀──to_client─── Backend stream
//! ```
//!
//! # Design Decisions
//! - Binary frames are reported and dropped; the session carries on
//! - Only valid UTF-8 goes out as text: backend bytes are re-cut on character
//!   boundaries and invalid UTF-8 ends the session as a transport error
//! - Ping/pong is answered by the WebSocket layer, never forwarded
//! - Either pump ending closes the whole session

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::OwnedSemaphorePermit;
use tracing::Instrument;

use crate::bridge::{BridgeConnection, BridgeError};
use crate::http::server::AppState;
use crate::observability::metrics;

const X_REQUEST_ID: &str = "x-request-id";

/// Upgrade handler for every bridged path.
pub async fn ws_handler(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let permit = match Arc::clone(&state.slots).try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!(
                active = state.tracker.active_count(),
                "Session limit reached, refusing upgrade"
            );
            metrics::record_session_rejected();
            return (StatusCode::SERVICE_UNAVAILABLE, "Session limit reached").into_response();
        }
    };

    let request_id = headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let mut request = Request::new(());
    *request.uri_mut() = uri;
    *request.headers_mut() = headers;

    ws.read_buffer_size(state.session.read_buffer_size)
        .write_buffer_size(state.session.write_buffer_size)
        .max_message_size(state.session.max_message_size)
        .on_failed_upgrade(|e: axum::Error| {
            let err = BridgeError::Upgrade(e.to_string());
            tracing::warn!(error = %err, "WebSocket upgrade failed");
            metrics::record_upgrade_failure();
        })
        .on_upgrade(move |socket| serve_socket(state, socket, request, request_id, permit))
}

async fn serve_socket(
    state: AppState,
    socket: WebSocket,
    request: Request<()>,
    request_id: String,
    _permit: OwnedSemaphorePermit,
) {
    let guard = state.tracker.track();
    let session_id = guard.id();
    let span = tracing::info_span!(
        "session",
        session_id = %session_id,
        request_id = %request_id,
        path = %request.uri().path(),
    );

    let bridge = Arc::new(BridgeConnection::new(
        session_id,
        request,
        Arc::clone(&state.resolver),
        Arc::clone(&state.connector),
        state.settings.clone(),
        state.sessions.child_token(),
    ));

    let (sink, stream) = socket.split();
    async move {
        tracing::info!("Session started");
        run_session(Arc::clone(&bridge), sink, stream).await;
        tracing::info!(
            endpoint = ?bridge.endpoint().map(|e| e.to_string()),
            errors = bridge.errors().len(),
            "Session finished"
        );
    }
    .instrument(span)
    .await;

    drop(guard);
}

/// Drive one session until either side finishes.
///
/// The client-read pump runs on its own task; backend payloads are written
/// to the client from this one. Returns once both pumps have stopped.
pub(crate) async fn run_session<Si, St>(bridge: Arc<BridgeConnection>, mut sink: Si, stream: St)
where
    Si: Sink<Message> + Unpin,
    Si::Error: std::fmt::Display,
    St: Stream<Item = Result<Message, axum::Error>> + Send + Unpin + 'static,
{
    let mut outbound = bridge.to_client();
    let reader = tokio::spawn(read_loop(Arc::clone(&bridge), stream).in_current_span());

    // Ends only once the backend pump drops its sender; everything queued
    // before that is written.
    while let Some(text) = outbound.recv().await {
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            let err = BridgeError::ClientWrite(e.to_string());
            tracing::warn!(error = %err, "Failed to write to client");
            metrics::record_client_write_failure();
            break;
        }
    }

    bridge.close();
    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;

    if let Err(e) = reader.await {
        tracing::error!(error = %e, "Client read task failed");
    }
}

async fn read_loop<St>(bridge: Arc<BridgeConnection>, mut stream: St)
where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let message = tokio::select! {
            biased;
            _ = bridge.closed() => break,
            message = stream.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => {
                let payload = Bytes::copy_from_slice(text.as_str().as_bytes());
                if let Err(e) = bridge.from_client(payload).await {
                    bridge.event_error(e);
                }
            }
            Some(Ok(Message::Binary(_))) => bridge.event_error(BridgeError::BinaryMessage),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(frame = ?frame, "Client closed the connection");
                break;
            }
            None => {
                tracing::debug!("Client stream ended");
                break;
            }
            Some(Err(e)) => {
                bridge.event_error(BridgeError::ClientRead(e.to_string()));
                break;
            }
        }
    }

    bridge.close();
}
