//! Transport abstraction.
//!
//! A channel is a full-duplex stream of text frames plus the address of the
//! peer that opened it. Hub and Leaf only ever see these traits; the
//! [`memory`] module wires them together in-process and
//! [`ws`](crate::ws) carries them over WebSocket.

use async_trait::async_trait;
use url::Url;

use statehub_core::StoreFingerprint;

use crate::error::{ConfigError, Result};

/// Write half of a channel.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame.
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Close the channel. Further sends fail.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a channel.
#[async_trait]
pub trait FrameStream: Send {
    /// The next text frame, or `None` once the peer has closed.
    async fn next_frame(&mut self) -> Option<Result<String>>;
}

/// One raw connection.
pub struct Channel {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
    /// Textual address of the remote peer.
    pub origin: String,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Source of incoming channels for one store.
#[async_trait]
pub trait Listener: Send {
    /// The next channel, or `None` once the listener is shut down.
    async fn accept(&mut self) -> Option<Channel>;
}

/// Opens outgoing channels.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Channel>;
}

/// Where a store's Hub can be reached.
///
/// The path is namespaced by the store fingerprint so several stores can
/// share one listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    secure: bool,
    host: String,
    port: u16,
    path: String,
}

impl Endpoint {
    /// Build an endpoint from a configured host.
    ///
    /// An `https://` prefix selects a secure endpoint; `http://` is
    /// accepted and ignored.
    pub fn new(host: &str, port: u16, fingerprint: &StoreFingerprint) -> Result<Self> {
        let host = host.trim();
        let (secure, bare) = if let Some(rest) = host.strip_prefix("https://") {
            (true, rest)
        } else if let Some(rest) = host.strip_prefix("http://") {
            (false, rest)
        } else {
            (false, host)
        };
        let bare = bare.trim_end_matches('/');
        if bare.is_empty() {
            return Err(ConfigError::MissingField("host").into());
        }

        let endpoint = Self {
            secure,
            host: bare.to_string(),
            port,
            path: Self::path_for(fingerprint),
        };
        let url = Url::parse(&endpoint.url())
            .map_err(|e| ConfigError::MalformedEndpoint(format!("{}: {e}", endpoint.url())))?;
        if url.host_str().is_none() || url.path() != endpoint.path {
            return Err(ConfigError::MalformedEndpoint(endpoint.url()).into());
        }
        Ok(endpoint)
    }

    /// The path a store's Hub listens on.
    pub fn path_for(fingerprint: &StoreFingerprint) -> String {
        format!("/statehub-{}", fingerprint.to_hex())
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full `ws://` or `wss://` URL.
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url())
    }
}

/// In-process transport for tests.
///
/// Channels are pairs of unbounded queues. Dropping or closing one side
/// ends the other side's stream.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use parking_lot::{Mutex, RwLock};
    use tokio::sync::mpsc;

    use crate::error::SyncError;

    struct MemorySink {
        tx: Option<mpsc::UnboundedSender<String>>,
    }

    #[async_trait]
    impl FrameSink for MemorySink {
        async fn send(&mut self, frame: String) -> Result<()> {
            let tx = self
                .tx
                .as_ref()
                .ok_or_else(|| SyncError::Transport("channel closed".into()))?;
            tx.send(frame)
                .map_err(|_| SyncError::Transport("peer disconnected".into()))
        }

        async fn close(&mut self) -> Result<()> {
            self.tx = None;
            Ok(())
        }
    }

    struct MemoryStream {
        rx: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl FrameStream for MemoryStream {
        async fn next_frame(&mut self) -> Option<Result<String>> {
            self.rx.recv().await.map(Ok)
        }
    }

    /// One directional pipe: frames sent on the sink come out of the stream.
    pub fn pipe() -> (Box<dyn FrameSink>, Box<dyn FrameStream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Box::new(MemorySink { tx: Some(tx) }),
            Box::new(MemoryStream { rx }),
        )
    }

    /// Two connected channels: `(near, far)`.
    pub fn duplex(near_origin: &str, far_origin: &str) -> (Channel, Channel) {
        let (near_sink, far_stream) = pipe();
        let (far_sink, near_stream) = pipe();
        (
            Channel {
                sink: near_sink,
                stream: near_stream,
                origin: far_origin.to_string(),
            },
            Channel {
                sink: far_sink,
                stream: far_stream,
                origin: near_origin.to_string(),
            },
        )
    }

    /// Registry of in-process listeners keyed by endpoint URL.
    #[derive(Default)]
    pub struct MemoryNetwork {
        listeners: RwLock<HashMap<String, mpsc::UnboundedSender<Channel>>>,
    }

    impl MemoryNetwork {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Listen on an endpoint, replacing any previous listener there.
        pub fn listen(&self, endpoint: &Endpoint) -> MemoryListener {
            let (tx, rx) = mpsc::unbounded_channel();
            self.listeners.write().insert(endpoint.url(), tx);
            MemoryListener { rx }
        }

        /// A connector whose channels report `origin` to the listener.
        pub fn connector(self: &Arc<Self>, origin: &str) -> MemoryConnector {
            MemoryConnector {
                network: Arc::clone(self),
                origin: Arc::new(Mutex::new(origin.to_string())),
            }
        }

        /// Whether a live listener is bound to the endpoint.
        pub fn is_listening(&self, endpoint: &Endpoint) -> bool {
            self.listeners
                .read()
                .get(&endpoint.url())
                .is_some_and(|tx| !tx.is_closed())
        }
    }

    /// Accepts channels opened by [`MemoryConnector`]s.
    pub struct MemoryListener {
        rx: mpsc::UnboundedReceiver<Channel>,
    }

    #[async_trait]
    impl Listener for MemoryListener {
        async fn accept(&mut self) -> Option<Channel> {
            self.rx.recv().await
        }
    }

    /// Opens channels on a [`MemoryNetwork`].
    ///
    /// Clones share the origin, so a test can move one clone into a Leaf and
    /// keep another to change the address it appears to come from.
    #[derive(Clone)]
    pub struct MemoryConnector {
        network: Arc<MemoryNetwork>,
        origin: Arc<Mutex<String>>,
    }

    impl MemoryConnector {
        pub fn set_origin(&self, origin: &str) {
            *self.origin.lock() = origin.to_string();
        }

        pub fn origin(&self) -> String {
            self.origin.lock().clone()
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn connect(&self, endpoint: &Endpoint) -> Result<Channel> {
            let listener = self
                .network
                .listeners
                .read()
                .get(&endpoint.url())
                .cloned()
                .ok_or_else(|| SyncError::Transport(format!("connection refused: {endpoint}")))?;

            let (near, far) = duplex(&self.origin(), endpoint.host());
            listener
                .send(far)
                .map_err(|_| SyncError::Transport(format!("connection refused: {endpoint}")))?;
            Ok(near)
        }
    }
}
