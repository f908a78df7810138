//! # Statehub Sync
//!
//! Replicates one store from a Hub to any number of Leaves over text
//! message channels.
//!
//! ## Overview
//!
//! - A [`Hub`] owns the authoritative store. It authenticates incoming
//!   sessions against a credential store and ban ledger, applies actions
//!   forwarded by Leaves, and relays every change to authenticated
//!   sessions.
//! - A [`Leaf`] holds one session to a Hub. It mirrors the Hub's state into
//!   its own store and forwards local dispatches. It reconnects on loss at
//!   a fixed interval, forever.
//!
//! Both roles talk through the [`transport`] traits. [`transport::memory`]
//! connects them in-process; [`ws`] carries them over WebSocket.
//!
//! ## Message Flow
//!
//! ```text
//! Leaf                                Hub
//!   |-------- AUTH ------------------->|  credentials checked, ban ledger
//!   |<------- AUTHSTATE ---------------|
//!   |-------- START ------------------>|
//!   |<------- ACTION_TO_WORKER --------|  full snapshot
//!   |-------- ACTION_TO_HUB ---------->|  applied, relayed to other leaves
//!   |<------- ACTION_TO_WORKER --------|  changes made elsewhere
//! ```
//!
//! ## Errors
//!
//! Setup problems are returned from [`Hub::start`] and [`Leaf::start`].
//! Anything that goes wrong afterwards is handed to an [`ErrorSink`].

pub mod config;
pub mod convergence;
pub mod error;
pub mod hub;
pub mod leaf;
pub mod messages;
pub mod session;
pub mod transport;
pub mod ws;

pub use config::{HubConfig, LeafConfig, DEFAULT_PORT};
pub use convergence::{state_digest, verify_convergence, ConvergenceResult};
pub use error::{ConfigError, ErrorSink, Result, SyncError};
pub use hub::Hub;
pub use leaf::{Delivery, Leaf};
pub use messages::{Envelope, Message};
pub use session::{Outbound, SessionEvent, SessionId, SessionState};
pub use transport::memory::{MemoryConnector, MemoryListener, MemoryNetwork};
pub use transport::{Channel, Connector, Endpoint, FrameSink, FrameStream, Listener};
pub use ws::{WsConnector, WsListener, WsServer};
