//! # Quizhall
//!
//! Real-time multiplayer quiz rooms over WebSocket.
//!
//! Participants connect with a stable identity, create or join a room by
//! code, and the room's leader runs a timed sequence of questions. The
//! server drives every countdown, collects answers, and broadcasts the
//! scoreboard when the last question elapses. A participant whose
//! connection drops keeps their seat for a short grace period.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quizhall::prelude::*;
//!
//! # async fn run() -> Result<(), QuizhallError> {
//! let server = QuizhallServer::builder()
//!     .bind("0.0.0.0:5000")
//!     .catalog(QuestionCatalog::builtin())
//!     .build(CallerIdentity)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::QuizhallError;
pub use server::{IDLE_TIMEOUT, PROTOCOL_VERSION, QuizhallServer, QuizhallServerBuilder};

/// Everything needed to configure, run, and talk to a server.
pub mod prelude {
    pub use crate::{
        IDLE_TIMEOUT, PROTOCOL_VERSION, QuizhallError, QuizhallServer,
        QuizhallServerBuilder,
    };
    pub use quizhall_protocol::{
        ClientRequest, Codec, Envelope, ErrorKind, JsonCodec, Participant,
        ParticipantId, Payload, Question, QuestionSet, QuestionSetId,
        RoomCode, RoomSnapshot, ScoreEntry, ServerEvent, SessionState,
    };
    pub use quizhall_room::{CatalogError, QuestionCatalog, RoomConfig, RoomError};
    pub use quizhall_session::{
        Authenticator, CallerIdentity, SessionConfig, SessionError,
    };
    pub use quizhall_tick::TickConfig;
}
