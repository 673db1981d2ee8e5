//! Core protocol types for Quizhall's wire format.
//!
//! Everything in this module is serialized onto the socket. Requests flow
//! from participants to the server, events flow back, and both ride inside
//! an [`Envelope`].

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The stable, caller-supplied identity of a participant.
///
/// This is the only durable key for a participant. It survives
/// reconnects; the connection it arrives on does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The code a room is created under. Unique across the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a question set in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionSetId(pub String);

impl From<&str> for QuestionSetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for QuestionSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Quiz content
// ---------------------------------------------------------------------------

/// A single question with its answer options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub prompt: String,
    pub options: Vec<String>,
    /// Must equal one of `options` exactly.
    pub correct_option: String,
}

impl Question {
    /// Returns `true` if `response` is exactly the correct option.
    pub fn is_correct(&self, response: &str) -> bool {
        self.correct_option == response
    }
}

/// An ordered, read-only list of questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub id: QuestionSetId,
    pub category: String,
    pub questions: Vec<Question>,
}

impl QuestionSet {
    /// Number of questions in the set.
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Returns `true` if the set has no questions.
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Returns the question at `index`, if any.
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }
}

// ---------------------------------------------------------------------------
// Room state as seen by clients
// ---------------------------------------------------------------------------

/// A member of a room's roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub identity: ParticipantId,
    pub display_name: String,
    /// Milliseconds since the Unix epoch.
    pub joined_at: u64,
}

/// The lifecycle state of a room's quiz session.
///
/// ```text
/// Idle ──start──→ Running ──last question elapsed──→ Ended
///  ↑                 │                                 │
///  └─────restart─────┴──────────────restart────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Ended,
}

impl SessionState {
    /// Returns `true` while questions are being played.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns `true` if a session has been started and not yet reset,
    /// i.e. a start request should be answered with a replay.
    pub fn has_started(&self) -> bool {
        matches!(self, Self::Running | Self::Ended)
    }

    /// Returns `true` if moving from `self` to `target` is a legal
    /// transition. Restart (→ Idle) is legal from every state.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Ended)
                | (_, Self::Idle)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}

/// A read-only view of a room, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub leader: ParticipantId,
    pub members: Vec<Participant>,
    pub question_set_id: QuestionSetId,
    pub session_state: SessionState,
    /// Index of the next question to be sent (only meaningful while Running).
    pub current_question_index: usize,
    pub question_count: usize,
}

/// One line of the final scoreboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub identity: ParticipantId,
    pub display_name: String,
    pub correct_count: usize,
}

// ---------------------------------------------------------------------------
// Errors on the wire
// ---------------------------------------------------------------------------

/// The category of a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Missing or malformed required fields.
    Validation,
    /// Unknown room or question set.
    NotFound,
    /// Duplicate room code.
    Conflict,
    /// Room is full.
    Capacity,
    /// Non-leader attempted a leader-only action.
    Authorization,
    /// Action is invalid for the current session state.
    State,
    /// Handshake or framing problem.
    Protocol,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::Capacity => "capacity",
            Self::Authorization => "authorization",
            Self::State => "state",
            Self::Protocol => "protocol",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ClientRequest: participant → server
// ---------------------------------------------------------------------------

/// Everything a participant can ask the server to do.
///
/// Internally tagged: `{ "type": "JoinRoom", "display_name": "Bo", "code": "Q1X9" }`.
/// Fields a participant may leave out are `Option`s so that a missing
/// field is reported as a validation failure rather than a decode error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientRequest {
    /// First frame on every connection. `identity` is the participant's
    /// stable id, reused across reconnects.
    Handshake {
        version: u32,
        #[serde(default)]
        identity: Option<String>,
    },

    /// Keep-alive.
    Heartbeat { client_time: u64 },

    ListQuestionSets,

    GetRoom { code: RoomCode },

    CreateRoom {
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        question_set_id: Option<QuestionSetId>,
        #[serde(default)]
        code: Option<RoomCode>,
    },

    JoinRoom {
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        code: Option<RoomCode>,
    },

    StartSession { code: RoomCode },

    RestartSession { code: RoomCode },

    SubmitAnswer {
        code: RoomCode,
        question_index: usize,
        response: String,
    },

    /// The client is going away; the server closes the socket.
    Disconnect { reason: String },
}

// ---------------------------------------------------------------------------
// ServerEvent: server → participant
// ---------------------------------------------------------------------------

/// Everything the server sends: direct replies and room broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    HandshakeAck {
        identity: ParticipantId,
        server_time: u64,
    },

    HeartbeatAck {
        client_time: u64,
        server_time: u64,
    },

    QuestionSets { sets: Vec<QuestionSet> },

    RoomInfo {
        room: RoomSnapshot,
        question_set: QuestionSet,
    },

    RoomCreated { code: RoomCode },

    RoomJoined { code: RoomCode },

    /// Acknowledges a start or restart request.
    Accepted { code: RoomCode },

    /// Private confirmation that an answer was stored.
    AnswerAccepted {
        code: RoomCode,
        question_index: usize,
    },

    RosterUpdated {
        code: RoomCode,
        leader: ParticipantId,
        members: Vec<Participant>,
    },

    ParticipantJoined { code: RoomCode, message: String },

    ParticipantLeft { code: RoomCode, message: String },

    LeaderChanged {
        code: RoomCode,
        leader: ParticipantId,
    },

    SessionStarted { code: RoomCode },

    Question {
        code: RoomCode,
        prompt: String,
        options: Vec<String>,
        question_index: usize,
    },

    /// Seconds (ticks) left on the current question.
    Timer { code: RoomCode, remaining: u32 },

    SessionEnded {
        code: RoomCode,
        results: Vec<ScoreEntry>,
    },

    SessionReset { code: RoomCode },

    Error { kind: ErrorKind, message: String },
}

impl ServerEvent {
    /// Builds an error event.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload / Envelope
// ---------------------------------------------------------------------------

/// The content of an envelope.
///
/// Adjacently tagged: `{ "type": "Request", "data": { "type": "ListQuestionSets" } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    Request(ClientRequest),
    Event(ServerEvent),
}

/// The top-level wire frame.
///
/// ```text
/// ┌─────────────────────────────────┐
/// │ seq: 42                         │  ← per-sender counter
/// │ timestamp: 15000                │  ← ms since connection start
/// │ reply_to: 7                     │  ← seq of the request answered
/// │ payload: Event(Timer { .. })    │
/// └─────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: u64,
    pub timestamp: u64,
    /// Set on direct replies; `None` on broadcasts and on requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<u64>,
    pub payload: Payload,
}

// =========================================================================
// Tests
// =========================================================================
