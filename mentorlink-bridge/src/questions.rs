//! Question/answer correlation.
//!
//! The [`QuestionBoard`] assigns an id to every question the bridge routes
//! and holds a pending entry until a matching answer arrives. Ids are
//! UUID v7 minted through a shared [`ContextV7`], which makes them
//! process-unique and strictly monotonic even within one millisecond.
//!
//! Pending entries carry a TTL. Expiry is evaluated lazily on `open` and
//! `resolve` rather than by a background sweeper: nothing observes an
//! expired question except a later attempt to answer it.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use uuid::{ContextV7, Timestamp, Uuid};

use mentorlink_proto::agent::AgentRole;
use mentorlink_proto::message::QuestionId;

/// Default lifetime of a pending question.
const DEFAULT_QUESTION_TTL: Duration = Duration::from_secs(300);

/// A question awaiting a matching answer.
///
/// Any agent may answer, not just one the question was shown to.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingQuestion {
    /// Agent id of the asker.
    pub asked_by: String,
    /// Role of the asker.
    pub asked_by_role: AgentRole,
    /// The question text, attached to the answer on resolution.
    pub question: String,
    /// Optional supporting context.
    pub context: Option<String>,
    /// When the question was opened.
    pub asked_at: Instant,
}

/// Error returned when an answer references a question the board no longer
/// holds: already answered, expired, or never opened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no pending question with id {0} (already answered, expired, or never asked)")]
pub struct UnknownQuestion(pub QuestionId);

/// Tracks pending questions and mints their identifiers.
pub struct QuestionBoard {
    pending: HashMap<QuestionId, PendingQuestion>,
    ttl: Duration,
    clock: ContextV7,
}

impl Default for QuestionBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionBoard {
    /// Creates an empty board with the default TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_QUESTION_TTL)
    }

    /// Creates an empty board whose pending entries expire after `ttl`.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            ttl,
            clock: ContextV7::new(),
        }
    }

    /// Opens a pending question and returns its bridge-assigned id.
    pub fn open(
        &mut self,
        question: String,
        context: Option<String>,
        asked_by: String,
        asked_by_role: AgentRole,
    ) -> QuestionId {
        self.expire(Instant::now());
        let id = QuestionId::from_uuid(Uuid::new_v7(Timestamp::now(&self.clock)));
        self.pending.insert(
            id,
            PendingQuestion {
                asked_by,
                asked_by_role,
                question,
                context,
                asked_at: Instant::now(),
            },
        );
        id
    }

    /// Resolves a pending question, removing its entry.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownQuestion`] if no pending entry exists — already
    /// answered, expired, or never opened.
    pub fn resolve(&mut self, id: QuestionId) -> Result<PendingQuestion, UnknownQuestion> {
        self.expire(Instant::now());
        self.pending.remove(&id).ok_or(UnknownQuestion(id))
    }

    /// Purges pending questions older than the TTL as of `now`.
    pub fn expire(&mut self, now: Instant) {
        let ttl = self.ttl;
        let before = self.pending.len();
        self.pending
            .retain(|_, q| now.duration_since(q.asked_at) < ttl);
        let expired = before - self.pending.len();
        if expired > 0 {
            tracing::debug!(expired, "expired pending questions");
        }
    }

    /// Number of questions currently pending.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
