//! The session manager: identity → current connection, plus grace timers.
//!
//! # Concurrency note
//!
//! `SessionManager` is not thread-safe by itself. The server keeps it
//! behind a `tokio::sync::Mutex` and holds the lock only for a single
//! call. Grace timers run as detached Tokio tasks; each one re-enters the
//! manager through the caller-supplied expiry future and must call
//! [`SessionManager::expire`] to confirm the participant is still gone.

use std::collections::HashMap;
use std::future::Future;

use quizhall_protocol::ParticipantId;
use quizhall_transport::ConnectionId;
use tokio::time::Instant;

use crate::{Session, SessionConfig, SessionError, SessionState, TransportHandle};

/// What [`SessionManager::bind`] found for the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// First connection seen for this identity.
    New,
    /// The identity was in its grace period; the pending removal was
    /// cancelled.
    Reconnected { previous: ConnectionId },
    /// The identity was still bound to another live connection, which
    /// no longer receives anything.
    Replaced { previous: ConnectionId },
}

impl BindOutcome {
    /// Returns `true` if rooms holding the identity need the new handle.
    pub fn needs_rebind(&self) -> bool {
        !matches!(self, Self::New)
    }
}

/// Registry of every participant identity seen by the server.
///
/// ## Lifecycle
///
/// ```text
/// bind() ──→ disconnect() ──(grace)──→ expire()
///   ↑              │
///   └── bind() ────┘   (cancels the pending expiry)
/// ```
pub struct SessionManager {
    sessions: HashMap<ParticipantId, Session>,
    config: SessionConfig,
}

impl SessionManager {
    /// Creates an empty registry.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
        }
    }

    /// Binds `identity` to a freshly accepted connection.
    ///
    /// Always succeeds: the newest connection wins. Any pending grace
    /// removal for the identity is cancelled.
    pub fn bind(
        &mut self,
        identity: ParticipantId,
        handle: TransportHandle,
    ) -> BindOutcome {
        let conn_id = handle.conn_id();

        if let Some(session) = self.sessions.get_mut(&identity) {
            let previous = session.handle.conn_id();
            if session.has_pending_expiry() {
                tracing::debug!(%identity, "grace period cancelled");
            }
            if let Some(task) = session.pending_expiry.take() {
                task.abort();
            }
            let outcome = match session.state {
                SessionState::Disconnected { .. } => {
                    BindOutcome::Reconnected { previous }
                }
                SessionState::Connected => BindOutcome::Replaced { previous },
            };
            session.handle = handle;
            session.state = SessionState::Connected;
            tracing::info!(%identity, %previous, %conn_id, "participant rebound");
            return outcome;
        }

        tracing::info!(%identity, %conn_id, "participant connected");
        self.sessions.insert(
            identity.clone(),
            Session {
                identity,
                state: SessionState::Connected,
                handle,
                pending_expiry: None,
            },
        );
        BindOutcome::New
    }

    /// Records that `conn_id` was lost and schedules `on_expiry` to run
    /// once the grace period elapses.
    ///
    /// `on_expiry` must call [`expire`](Self::expire) with the same
    /// arguments and act only if it returns `true`; a bind that races
    /// the timer is only caught there.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: the identity was never bound
    /// - [`SessionError::StaleConnection`]: the identity has since been
    ///   bound to another connection; nothing is scheduled
    pub fn disconnect<F>(
        &mut self,
        identity: &ParticipantId,
        conn_id: ConnectionId,
        on_expiry: F,
    ) -> Result<(), SessionError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let session = self
            .sessions
            .get_mut(identity)
            .ok_or_else(|| SessionError::NotFound(identity.clone()))?;

        if session.handle.conn_id() != conn_id {
            return Err(SessionError::StaleConnection {
                identity: identity.clone(),
                conn_id,
            });
        }

        if let Some(task) = session.pending_expiry.take() {
            task.abort();
        }

        let grace = self.config.reconnect_grace;
        session.state = SessionState::Disconnected {
            since: Instant::now(),
        };
        let task = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            on_expiry.await;
        });
        session.pending_expiry = Some(task.abort_handle());

        tracing::info!(
            %identity,
            %conn_id,
            grace_ms = grace.as_millis() as u64,
            "transport lost, grace period started"
        );
        Ok(())
    }

    /// Removes the session if it is still disconnected on `conn_id`.
    ///
    /// Returns `true` if the caller should go on and remove the
    /// participant from its rooms.
    pub fn expire(
        &mut self,
        identity: &ParticipantId,
        conn_id: ConnectionId,
    ) -> bool {
        let still_gone = self.sessions.get(identity).is_some_and(|s| {
            matches!(s.state, SessionState::Disconnected { .. })
                && s.handle.conn_id() == conn_id
        });
        if still_gone {
            self.sessions.remove(identity);
            tracing::info!(%identity, %conn_id, "grace period elapsed, session expired");
        } else {
            tracing::debug!(%identity, %conn_id, "expiry skipped, participant came back");
        }
        still_gone
    }

    /// Looks up a session by identity.
    pub fn get(&self, identity: &ParticipantId) -> Option<&Session> {
        self.sessions.get(identity)
    }

    /// The connection currently bound to `identity`, if any.
    pub fn handle(&self, identity: &ParticipantId) -> Option<&TransportHandle> {
        self.sessions.get(identity).map(Session::handle)
    }

    /// Whether `conn_id` is the connection currently bound to `identity`.
    ///
    /// A connection that a newer one has replaced stays open until the
    /// client closes it, but it no longer speaks for the identity.
    pub fn is_current(&self, identity: &ParticipantId, conn_id: ConnectionId) -> bool {
        self.handle(identity)
            .is_some_and(|handle| handle.conn_id() == conn_id)
    }

    /// Number of known identities (connected or in grace).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no identities are known.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
