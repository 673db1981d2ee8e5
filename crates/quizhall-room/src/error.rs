//! Error types for the room layer.

use quizhall_protocol::{ErrorKind, ParticipantId, QuestionSetId, RoomCode};

/// Errors that can occur during room operations.
///
/// Every variant is reported back to the requester only; none of them
/// affect other members of the room.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// A required field was missing, blank, or out of range.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The requested question set is not in the catalog.
    #[error("question set {0} not found")]
    QuestionSetNotFound(QuestionSetId),

    /// A room with this code already exists.
    #[error("room {0} already exists")]
    Conflict(RoomCode),

    /// The room is full and the caller is not already a member.
    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// A leader-only action was attempted by someone else.
    #[error("only the room leader can {action}")]
    NotLeader { action: &'static str },

    /// The caller is not a member of the room.
    #[error("{identity} is not a member of room {code}")]
    NotMember {
        identity: ParticipantId,
        code: RoomCode,
    },

    /// The session is in a state that doesn't allow this operation.
    #[error("{0}")]
    InvalidState(String),

    /// The room's command channel is closed; the actor has stopped.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),
}

impl RoomError {
    /// The wire category this error is reported under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_)
            | Self::QuestionSetNotFound(_)
            | Self::Unavailable(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::RoomFull(_) => ErrorKind::Capacity,
            Self::NotLeader { .. } | Self::NotMember { .. } => {
                ErrorKind::Authorization
            }
            Self::InvalidState(_) => ErrorKind::State,
        }
    }
}

/// Errors raised while loading a question catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Json(#[from] serde_json::Error),

    /// The catalog parsed but violates a content rule.
    #[error("invalid catalog: {0}")]
    Invalid(String),
}
