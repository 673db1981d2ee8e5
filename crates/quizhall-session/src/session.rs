//! Session types: the registry's record of one participant identity.
//!
//! A session tracks:
//! - WHO the participant is (`ParticipantId`)
//! - WHERE to reach them right now (`TransportHandle`)
//! - WHETHER that connection is alive, and since when it has not been

use std::time::Duration;

use quizhall_protocol::{ParticipantId, ServerEvent};
use quizhall_transport::ConnectionId;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a participant whose connection dropped stays in their
    /// rooms before being removed.
    ///
    /// Default: 2 seconds.
    pub reconnect_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(2),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound delivery
// ---------------------------------------------------------------------------

/// One outbound event queued for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The request sequence number this event answers, if it is a reply.
    pub reply_to: Option<u64>,
    pub event: ServerEvent,
}

/// Queue feeding a connection's writer task.
pub type OutboundSender = mpsc::UnboundedSender<Delivery>;

/// Where to send events for a participant right now.
///
/// Cheap to clone. Rooms store one per member and replace it whenever the
/// member reconnects.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    conn_id: ConnectionId,
    sender: OutboundSender,
}

impl TransportHandle {
    /// Wraps a connection's outbound queue.
    pub fn new(conn_id: ConnectionId, sender: OutboundSender) -> Self {
        Self { conn_id, sender }
    }

    /// The connection this handle routes to.
    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Queues a broadcast event. Returns `false` if the connection's
    /// writer is gone; the event is dropped.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender
            .send(Delivery {
                reply_to: None,
                event,
            })
            .is_ok()
    }

    /// Queues a direct reply to the request with sequence `reply_to`.
    pub fn reply(&self, reply_to: u64, event: ServerEvent) -> bool {
        self.sender
            .send(Delivery {
                reply_to: Some(reply_to),
                event,
            })
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Whether the identity's current connection is alive.
///
/// ```text
///   Connected ──(transport lost)──→ Disconnected ──(grace elapsed)──→ removed
///       ↑                                │
///       └──────────(bind)────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Disconnected { since: Instant },
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One identity's registry entry.
#[derive(Debug)]
pub struct Session {
    pub identity: ParticipantId,
    pub state: SessionState,
    pub(crate) handle: TransportHandle,
    /// The grace task that will remove this participant, if one is pending.
    pub(crate) pending_expiry: Option<AbortHandle>,
}

impl Session {
    /// The connection currently bound to this identity.
    pub fn handle(&self) -> &TransportHandle {
        &self.handle
    }

    /// Returns `true` if a grace-period removal is scheduled.
    pub fn has_pending_expiry(&self) -> bool {
        self.pending_expiry
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}
