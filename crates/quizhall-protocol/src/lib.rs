//! Wire protocol for Quizhall.
//!
//! This crate defines the language participants and the server speak:
//!
//! - **Types** ([`Envelope`], [`ClientRequest`], [`ServerEvent`], the
//!   identity newtypes): the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages
//!   are converted to and from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding
//!   or decoding.
//!
//! The protocol layer knows nothing about connections or rooms; it only
//! describes messages.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Session / Room
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientRequest, Envelope, ErrorKind, Participant, ParticipantId, Payload,
    Question, QuestionSet, QuestionSetId, RoomCode, RoomSnapshot, ScoreEntry,
    ServerEvent, SessionState,
};
