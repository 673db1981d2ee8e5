//! Error types for the session layer.

use quizhall_protocol::ParticipantId;
use quizhall_transport::ConnectionId;

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The handshake identity was missing or rejected by the
    /// [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No session exists for the given identity.
    #[error("session not found for {0}")]
    NotFound(ParticipantId),

    /// A connection reported a loss after the identity had already been
    /// bound to a newer connection.
    #[error("{conn_id} is no longer the current connection for {identity}")]
    StaleConnection {
        identity: ParticipantId,
        conn_id: ConnectionId,
    },
}
