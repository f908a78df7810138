//! WebSocket transport.
//!
//! [`WsServer`] owns one TCP listener and routes upgrade requests by path to
//! per-store [`WsListener`]s, so any number of Hubs can share a port.
//! Requests for an unknown path are refused with 404.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_hdr_async, connect_async, WebSocketStream};
use tracing::{debug, info, warn};

use statehub_core::StoreFingerprint;

use crate::error::{Result, SyncError};
use crate::transport::{Channel, Connector, Endpoint, FrameSink, FrameStream, Listener};

const FORWARDED_FOR: &str = "x-forwarded-for";

type Routes = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Channel>>>>;

struct WsSink<S> {
    inner: SplitSink<WebSocketStream<S>, WsMessage>,
}

#[async_trait]
impl<S> FrameSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, frame: String) -> Result<()> {
        self.inner
            .send(WsMessage::Text(frame))
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.inner
            .close()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))
    }
}

struct WsStream<S> {
    inner: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> FrameStream for WsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn next_frame(&mut self) -> Option<Result<String>> {
        while let Some(message) = self.inner.next().await {
            match message {
                Ok(WsMessage::Text(text)) => return Some(Ok(text)),
                Ok(WsMessage::Binary(bytes)) => {
                    return Some(String::from_utf8(bytes).map_err(|e| SyncError::Parse(e.to_string())))
                }
                Ok(WsMessage::Close(_)) => return None,
                // Ping, pong and raw frames.
                Ok(_) => continue,
                Err(e) => return Some(Err(SyncError::Transport(e.to_string()))),
            }
        }
        None
    }
}

fn into_channel<S>(socket: WebSocketStream<S>, origin: String) -> Channel
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = socket.split();
    Channel {
        sink: Box::new(WsSink { inner: sink }),
        stream: Box::new(WsStream { inner: stream }),
        origin,
    }
}

/// A WebSocket listener shared by every store served on one port.
pub struct WsServer {
    local_addr: SocketAddr,
    routes: Routes,
    task: JoinHandle<()>,
}

impl WsServer {
    /// Bind and start accepting.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SyncError::Transport(format!("bind failed: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        let routes = Routes::default();
        let task = tokio::spawn(accept_loop(listener, Arc::clone(&routes)));
        info!(%local_addr, "websocket server listening");

        Ok(Self {
            local_addr,
            routes,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Route upgrades for a store to a new listener.
    ///
    /// Replaces any listener previously registered for the same store.
    pub fn listener(&self, fingerprint: &StoreFingerprint) -> WsListener {
        let path = Endpoint::path_for(fingerprint);
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.write().insert(path.clone(), tx);
        debug!(%path, "websocket route registered");
        WsListener { path, rx }
    }

    /// Stop accepting. Established channels are not affected.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for WsServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(listener: TcpListener, routes: Routes) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handshake(stream, peer, Arc::clone(&routes)));
            }
            Err(error) => {
                warn!(%error, "tcp accept failed");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}

/// First entry of `X-Forwarded-For`, if any.
fn forwarded_origin(request: &Request) -> Option<String> {
    request
        .headers()
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

async fn handshake(stream: TcpStream, peer: SocketAddr, routes: Routes) {
    let mut route = None;

    let callback = |request: &Request, response: Response| {
        let path = request.uri().path();
        let Some(sender) = routes.read().get(path).cloned() else {
            let mut refusal = ErrorResponse::new(Some(format!("no store at {path}")));
            *refusal.status_mut() = StatusCode::NOT_FOUND;
            return Err(refusal);
        };
        let origin = forwarded_origin(request).unwrap_or_else(|| peer.ip().to_string());
        route = Some((sender, origin));
        Ok(response)
    };

    let socket = match accept_hdr_async(stream, callback).await {
        Ok(socket) => socket,
        Err(error) => {
            debug!(%peer, %error, "websocket handshake refused");
            return;
        }
    };

    let Some((sender, origin)) = route else {
        return;
    };
    if sender.send(into_channel(socket, origin)).is_err() {
        debug!(%peer, "store listener is gone");
    }
}

/// Channels for one store, fed by a [`WsServer`].
pub struct WsListener {
    path: String,
    rx: mpsc::UnboundedReceiver<Channel>,
}

impl WsListener {
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl Listener for WsListener {
    async fn accept(&mut self) -> Option<Channel> {
        self.rx.recv().await
    }
}

/// Dials Hubs over WebSocket.
///
/// `wss://` endpoints need a TLS-enabled build of `tokio-tungstenite`;
/// without one the connect attempt fails and the Leaf keeps retrying.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Channel> {
        let (socket, _) = connect_async(endpoint.url())
            .await
            .map_err(|e| SyncError::Transport(format!("connect to {endpoint} failed: {e}")))?;
        Ok(into_channel(socket, endpoint.host().to_string()))
    }
}
