//! Unified error type for Quizhall.

use quizhall_protocol::ProtocolError;
use quizhall_room::{CatalogError, RoomError};
use quizhall_session::SessionError;
use quizhall_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates `From` impls, so the
/// `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum QuizhallError {
    /// A transport-level error (accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, bad handshake).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (identity rejected, unknown session).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (full, not found, wrong state).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The question catalog could not be loaded.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
