//! Participant sessions for Quizhall.
//!
//! This crate is the identity & transport registry:
//!
//! 1. **Identity**: turning the handshake's caller-supplied id into a
//!    [`ParticipantId`](quizhall_protocol::ParticipantId) ([`Authenticator`])
//! 2. **Transport binding**: which live connection currently speaks for
//!    an identity ([`SessionManager::bind`], [`TransportHandle`])
//! 3. **Reconnection grace**: delaying removal after a connection drops,
//!    and cancelling it when the same identity comes back
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← routes broadcasts through TransportHandles
//!     ↕
//! Session Layer (this crate)  ← identity → current connection
//!     ↕
//! Protocol / Transport (below)  ← ParticipantId, ServerEvent, ConnectionId
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod manager;
mod session;

pub use auth::{Authenticator, CallerIdentity};
pub use error::SessionError;
pub use manager::{BindOutcome, SessionManager};
pub use session::{
    Delivery, OutboundSender, Session, SessionConfig, SessionState,
    TransportHandle,
};
