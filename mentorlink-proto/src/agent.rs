//! Participant identity types for `MentorLink`.
//!
//! Defines the [`AgentRole`] a participant registers under, the roster
//! entry shape carried in state snapshots, and the agent ID validation
//! rules applied by the bridge at registration time.

use serde::{Deserialize, Serialize};

/// The role a participant plays in a teaching session.
///
/// Roles are fixed at registration time and drive message routing: an
/// important status update escalates to every teaching agent, and a
/// student's question fans out to teaching and coding agents only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    /// The automated agent making code changes.
    CodingAgent,
    /// The agent narrating and explaining changes to the student.
    TeachingAgent,
    /// The human learner.
    Student,
}

impl AgentRole {
    /// Returns the wire representation of the role (kebab-case).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CodingAgent => "coding-agent",
            Self::TeachingAgent => "teaching-agent",
            Self::Student => "student",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection-lifetime status of a registered agent.
///
/// Every registered agent is simply active until its connection closes;
/// there is no richer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered and connected.
    Active,
}

/// One roster entry in a [`StateSnapshot`](crate::message::BridgeMessage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    /// The agent's registered identifier.
    pub id: String,
    /// The role the agent registered under.
    pub role: AgentRole,
    /// Connection-lifetime status.
    pub status: AgentStatus,
}

// ---------------------------------------------------------------------------
// Agent ID validation
// ---------------------------------------------------------------------------

/// Maximum length for an agent ID in characters.
const MAX_AGENT_ID_LEN: usize = 64;

/// Error returned when an agent ID fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid agent id: {0}")]
pub struct InvalidAgentId(pub String);

/// Validates and sanitizes an agent ID string.
///
/// Processing steps:
/// 1. Strip all control characters.
/// 2. Trim leading and trailing whitespace.
/// 3. Truncate to [`MAX_AGENT_ID_LEN`] characters.
/// 4. If the result is empty, return an error.
///
/// # Errors
///
/// Returns [`InvalidAgentId`] if the ID is empty or contains only invalid
/// characters after sanitization.
pub fn validate_agent_id(id: &str) -> Result<String, InvalidAgentId> {
    let sanitized: String = id.chars().filter(|c| !c.is_control()).collect();
    let sanitized = sanitized.trim();

    if sanitized.is_empty() {
        return Err(InvalidAgentId(
            "agent id is empty after sanitization".to_string(),
        ));
    }

    let truncated: String = sanitized.chars().take(MAX_AGENT_ID_LEN).collect();
    Ok(truncated)
}
