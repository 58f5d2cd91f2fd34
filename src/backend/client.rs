//! HTTP/2 cleartext stream client.
//!
//! # Responsibilities
//! - Hold the process-wide pooled HTTP/2 client
//! - Open one streaming POST per session
//! - Expose the request body as the write half and the response body as the read half
//!
//! # Design Decisions
//! - HTTP/2 with prior knowledge over plain TCP (h2c); backends sit on a
//!   trusted network
//! - The response is awaited lazily by the reader, so backends that wait for
//!   the first request bytes before answering do not deadlock the session
//! - Connect failures and bad statuses surface on the first read

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request};
use bytes::Bytes;
use futures_util::{stream, SinkExt, TryStreamExt};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

use crate::backend::{BackendError, BackendStream, StreamConnector};
use crate::config::BackendConfig;
use crate::routing::Endpoint;

/// Opens backend streams over a shared HTTP/2 cleartext client.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct H2cConnector {
    client: Client<HttpConnector, Body>,
    body_buffer: usize,
}

impl H2cConnector {
    pub fn new(config: &BackendConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.connect_timeout()));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .http2_only(true)
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .build(connector);

        Self {
            client,
            body_buffer: config.body_buffer.max(1),
        }
    }
}

#[async_trait]
impl StreamConnector for H2cConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<BackendStream, BackendError> {
        let (body_tx, body_rx) = mpsc::channel::<Bytes>(self.body_buffer);

        let body = Body::from_stream(stream::unfold(body_rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok::<_, io::Error>(chunk), rx))
        }));

        let request = Request::builder()
            .method(Method::POST)
            .uri(endpoint.uri().clone())
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .map_err(|e| BackendError::Connect(e.to_string()))?;

        let pending = self.client.request(request);
        let target = endpoint.to_string();

        let response = async move {
            let response = pending.await.map_err(|e| {
                if e.is_connect() {
                    BackendError::Connect(format!("{target}: {e}"))
                } else {
                    BackendError::Transport(format!("{target}: {e}"))
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(BackendError::Status(status));
            }
            tracing::debug!(endpoint = %target, status = %status, "Backend stream established");

            Ok(Body::new(response.into_body())
                .into_data_stream()
                .map_err(BackendError::transport))
        };

        let reader = stream::once(response).try_flatten();
        let writer = PollSender::new(body_tx).sink_map_err(|_| BackendError::Closed);

        Ok(BackendStream::new(reader, writer))
    }
}

impl std::fmt::Debug for H2cConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("H2cConnector")
            .field("body_buffer", &self.body_buffer)
            .finish_non_exhaustive()
    }
}
