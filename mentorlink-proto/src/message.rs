//! Wire format message types for the `MentorLink` bridge protocol.
//!
//! Two tagged unions, one per direction: [`AgentMessage`] is what a
//! participant sends to the bridge, [`BridgeMessage`] is what the bridge
//! delivers. Every routed `BridgeMessage` carries a `from`/`from_role`
//! pair stamped by the bridge from the sending connection's registry
//! record, so a sender can never spoof another agent's identity.
//!
//! All variants are JSON-serialized as `{"type": "<snake_case_variant>", ...}`
//! and exchanged as WebSocket text frames.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{AgentRole, AgentSummary};

/// Unique identifier for a question, assigned by the bridge at receipt time.
///
/// Backed by UUID v7: time-ordered across milliseconds and, when minted
/// through a shared [`uuid::ContextV7`], strictly monotonic within one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuestionId(Uuid);

impl QuestionId {
    /// Creates a new time-ordered question identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `QuestionId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for QuestionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Participant -> bridge messages
// ---------------------------------------------------------------------------

/// Messages sent from a participant to the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Declares the participant's identity. Must be the first message on a
    /// connection; everything sent before it is rejected.
    Register {
        /// Caller-supplied unique identifier.
        agent_id: String,
        /// Role this participant plays for the whole connection.
        role: AgentRole,
        /// Free-form capability tags (advisory only, not enforced).
        capabilities: Vec<String>,
    },
    /// A conversational message, broadcast or directed.
    Chat {
        /// The message text (opaque to the bridge).
        content: String,
        /// Target agent id; `None` means broadcast to everyone else.
        to: Option<String>,
    },
    /// A progress/status update about what the sender is doing.
    Status {
        /// Short machine-ish description of the activity (e.g. `"editing"`).
        action: String,
        /// Human-readable detail text.
        details: String,
        /// Important updates are additionally escalated to teaching agents.
        important: bool,
    },
    /// A question for the session. The bridge assigns the id.
    Question {
        /// The question text.
        question: String,
        /// Optional supporting context (a code snippet, a file name, ...).
        context: Option<String>,
    },
    /// An answer to a previously asked question.
    Answer {
        /// Id the bridge assigned when the question was routed.
        question_id: QuestionId,
        /// The answer text.
        answer: String,
    },
}

// ---------------------------------------------------------------------------
// Bridge -> participant messages
// ---------------------------------------------------------------------------

/// Messages delivered by the bridge to a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    /// A chat message from another participant.
    Chat {
        /// Sender's agent id (stamped by the bridge).
        from: String,
        /// Sender's role (stamped by the bridge).
        from_role: AgentRole,
        /// The message text.
        content: String,
        /// The addressee for a directed message, `None` for broadcast.
        to: Option<String>,
    },
    /// A status update from another participant.
    Status {
        /// Sender's agent id.
        from: String,
        /// Sender's role.
        from_role: AgentRole,
        /// Activity description.
        action: String,
        /// Human-readable detail text.
        details: String,
        /// Whether this update was escalated to teaching agents.
        important: bool,
    },
    /// A question routed into the session.
    Question {
        /// Bridge-assigned identifier, referenced by answers.
        id: QuestionId,
        /// Asker's agent id.
        from: String,
        /// Asker's role.
        from_role: AgentRole,
        /// The question text.
        question: String,
        /// Optional supporting context.
        context: Option<String>,
        /// `true` on the copy delivered to coding agents for a student's
        /// question: context they may observe, not necessarily answer.
        contextual: bool,
    },
    /// An answer observed by the whole session.
    Answer {
        /// Id of the question being answered.
        question_id: QuestionId,
        /// Answerer's agent id.
        from: String,
        /// Answerer's role.
        from_role: AgentRole,
        /// The answer text.
        answer: String,
        /// The original question text, when the bridge still held it.
        question: Option<String>,
    },
    /// A participant entered the session.
    AgentJoined {
        /// The new agent's id.
        agent_id: String,
        /// The new agent's role.
        role: AgentRole,
        /// The new agent's capability tags.
        capabilities: Vec<String>,
    },
    /// A participant left the session.
    AgentLeft {
        /// The departed agent's id.
        agent_id: String,
    },
    /// Sent once to each connection right after successful registration:
    /// the current roster plus recent conversation history.
    StateSnapshot {
        /// Every currently registered agent.
        agents: Vec<AgentSummary>,
        /// Recent conversation entries, oldest first.
        recent_conversation: Vec<BridgeMessage>,
    },
    /// An error from the bridge about this connection's own traffic.
    Error {
        /// Machine-readable error code (e.g. `"not_registered"`).
        code: String,
        /// Human-readable error description.
        message: String,
    },
}

/// Discriminant of a [`BridgeMessage`], used for handler registration in
/// the agent client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`BridgeMessage::Chat`]
    Chat,
    /// [`BridgeMessage::Status`]
    Status,
    /// [`BridgeMessage::Question`]
    Question,
    /// [`BridgeMessage::Answer`]
    Answer,
    /// [`BridgeMessage::AgentJoined`]
    AgentJoined,
    /// [`BridgeMessage::AgentLeft`]
    AgentLeft,
    /// [`BridgeMessage::StateSnapshot`]
    StateSnapshot,
    /// [`BridgeMessage::Error`]
    Error,
}

impl BridgeMessage {
    /// Returns the discriminant of this message.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Chat { .. } => EventKind::Chat,
            Self::Status { .. } => EventKind::Status,
            Self::Question { .. } => EventKind::Question,
            Self::Answer { .. } => EventKind::Answer,
            Self::AgentJoined { .. } => EventKind::AgentJoined,
            Self::AgentLeft { .. } => EventKind::AgentLeft,
            Self::StateSnapshot { .. } => EventKind::StateSnapshot,
            Self::Error { .. } => EventKind::Error,
        }
    }
}
