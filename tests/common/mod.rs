//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt, TryStreamExt};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use ws_bridge::config::{BridgeConfig, RouteConfig};
use ws_bridge::lifecycle::Shutdown;
use ws_bridge::BridgeServer;

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const WAIT: Duration = Duration::from_secs(5);

/// Start an HTTP/2 cleartext backend on an ephemeral port.
///
/// Every stream request is answered by `handler`.
pub async fn start_h2c_backend<F>(handler: F) -> SocketAddr
where
    F: Fn(Request<Incoming>) -> Response<Body> + Clone + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let handler = handler.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let response = handler(req);
                    async move { Ok::<_, Infallible>(response) }
                });
                let _ = hyper::server::conn::http2::Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(socket), service)
                    .await;
            });
        }
    });

    addr
}

/// Backend that streams back the upper-cased request body.
pub async fn start_shouting_backend() -> SocketAddr {
    start_h2c_backend(|req| {
        let upper = Body::new(req.into_body())
            .into_data_stream()
            .map_ok(|chunk| Bytes::from(chunk.to_ascii_uppercase()));
        Response::new(Body::from_stream(upper))
    })
    .await
}

/// Backend that answers every stream with a fixed body and ends it.
pub async fn start_fixed_backend(reply: &'static str) -> SocketAddr {
    start_h2c_backend(move |_req| Response::new(Body::from(reply))).await
}

pub fn route(name: &str, backend: SocketAddr) -> RouteConfig {
    RouteConfig {
        name: name.into(),
        host: None,
        path_prefix: Some("/".into()),
        backend: format!("http://{backend}/stream"),
        priority: 0,
        forward_path: true,
        strip_prefix: false,
    }
}

pub fn config_for(backend: SocketAddr) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.routes.push(route("default", backend));
    config.shutdown.drain_timeout_secs = 2;
    config
}

pub struct RunningBridge {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub config_updates: mpsc::UnboundedSender<BridgeConfig>,
    pub task: JoinHandle<Result<(), std::io::Error>>,
}

/// Start a bridge on an ephemeral port.
pub async fn start_bridge(config: BridgeConfig) -> RunningBridge {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (config_updates, updates_rx) = mpsc::unbounded_channel();
    let server = BridgeServer::new(config);
    let server_shutdown = shutdown.clone();

    let task = tokio::spawn(async move { server.run(listener, updates_rx, server_shutdown).await });

    RunningBridge {
        addr,
        shutdown,
        config_updates,
        task,
    }
}

pub async fn connect(addr: SocketAddr, path: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}{path}")).await.unwrap();
    ws
}

pub async fn send_text(ws: &mut Client, text: &str) {
    ws.send(Message::text(text)).await.unwrap();
}

/// Read text frames until their concatenation equals `expected`.
pub async fn expect_text(ws: &mut Client, expected: &str) {
    let mut received = String::new();
    while received.len() < expected.len() {
        match tokio::time::timeout(WAIT, ws.next()).await.expect("timed out") {
            Some(Ok(Message::Text(text))) => received.push_str(text.as_str()),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            other => panic!("expected text {expected:?}, got {other:?} after {received:?}"),
        }
    }
    assert_eq!(received, expected);
}

/// Wait until the bridge closes the session.
pub async fn expect_closed(ws: &mut Client) {
    loop {
        match tokio::time::timeout(WAIT, ws.next()).await.expect("timed out") {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(other)) => panic!("expected close, got {other:?}"),
        }
    }
}
