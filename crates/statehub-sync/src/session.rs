//! Connection session state machine and per-session outbound queue.
//!
//! ```text
//!  Connecting --Opened--> AuthPending --AuthAccepted--> Authenticated
//!                              |
//!                              +--AuthRejected--> Closed
//!
//!  any --Closed--> Closed
//! ```
//!
//! A Hub session starts in `AuthPending`; the Hub never observes the
//! connecting phase. A Leaf session walks the whole machine.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::error::{ErrorSink, Result, SyncError};
use crate::messages::Envelope;
use crate::transport::FrameSink;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    AuthPending,
    Authenticated,
    /// Terminal.
    Closed,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// The raw channel opened and credentials were sent.
    Opened,
    /// The Hub accepted the credentials.
    AuthAccepted,
    /// The Hub refused the credentials.
    AuthRejected,
    /// The channel closed or failed.
    Closed,
}

impl SessionState {
    /// Apply an event.
    pub fn on(self, event: SessionEvent) -> Result<SessionState> {
        use SessionEvent as E;
        use SessionState as S;

        match (self, event) {
            (_, E::Closed) => Ok(S::Closed),
            (S::Connecting, E::Opened) => Ok(S::AuthPending),
            (S::AuthPending, E::AuthAccepted) => Ok(S::Authenticated),
            (S::AuthPending, E::AuthRejected) => Ok(S::Closed),
            (state, event) => Err(SyncError::IllegalTransition { state, event }),
        }
    }

    pub fn is_authenticated(self) -> bool {
        self == SessionState::Authenticated
    }

    pub fn is_closed(self) -> bool {
        self == SessionState::Closed
    }
}

/// Identifies one session on a Hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug)]
enum Outgoing {
    Frame(String),
    Close,
}

/// Handle to a session's outbound queue.
///
/// Sending never waits on the peer. Frames leave in the order they were
/// queued. Closing is idempotent.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Outbound {
    /// Encode and queue an envelope.
    pub fn send(&self, envelope: &Envelope) -> Result<()> {
        self.send_frame(envelope.encode()?)
    }

    /// Queue an already-encoded frame.
    pub fn send_frame(&self, frame: String) -> Result<()> {
        self.tx
            .send(Outgoing::Frame(frame))
            .map_err(|_| SyncError::Transport("session writer has stopped".into()))
    }

    /// Ask the writer to flush what is queued and close the channel.
    pub fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }

    /// Whether the writer is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the task that drains a session's queue into its sink.
///
/// `done` is notified once the writer stops for any reason: an explicit
/// close, a failed write, or every [`Outbound`] handle being dropped. A
/// failed write is reported to `errors`.
pub fn spawn_writer(
    mut sink: Box<dyn FrameSink>,
    done: Arc<Notify>,
    errors: ErrorSink,
) -> (Outbound, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        while let Some(outgoing) = rx.recv().await {
            match outgoing {
                Outgoing::Frame(frame) => {
                    if let Err(error) = sink.send(frame).await {
                        errors.report(&error);
                        break;
                    }
                }
                Outgoing::Close => break,
            }
        }
        rx.close();
        if let Err(error) = sink.close().await {
            tracing::debug!(%error, "close after writer stop failed");
        }
        done.notify_one();
    });

    (Outbound { tx }, handle)
}
