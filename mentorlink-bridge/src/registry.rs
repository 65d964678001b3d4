//! Registry of connected participants.
//!
//! Tracks which agent is bound to which live connection, enforces agent id
//! uniqueness across connections, and hands out the recipient sets the
//! router needs. The registry itself is a plain map; the bridge serializes
//! all access behind its session lock.

use std::collections::HashMap;

use tokio::sync::mpsc;

use mentorlink_proto::agent::{AgentRole, AgentStatus, AgentSummary};
use mentorlink_proto::message::BridgeMessage;

/// Identifies one live connection for the lifetime of the process.
pub type ConnectionId = u64;

/// A participant admitted into the session.
#[derive(Debug)]
pub struct RegisteredAgent {
    /// Connection this agent is bound to.
    pub conn_id: ConnectionId,
    /// The agent's registered identifier.
    pub agent_id: String,
    /// Role, immutable while connected.
    pub role: AgentRole,
    /// Advisory capability tags.
    pub capabilities: Vec<String>,
    /// Bounded outbound queue feeding the connection's writer task.
    pub sender: mpsc::Sender<BridgeMessage>,
}

/// Errors returned by [`AgentRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The agent id is live on a different connection.
    #[error("agent id {0:?} is already registered on another connection")]
    DuplicateId(String),

    /// The connection is already registered under a different identity.
    /// Id and role are immutable while connected.
    #[error("connection is already registered as {0:?}")]
    AlreadyRegistered(String),
}

/// Outcome of a successful [`AgentRegistry::register`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A new agent was admitted.
    Registered,
    /// The connection re-registered with the same identity; only its
    /// capabilities were updated.
    Updated,
}

/// Map of live connections to registered agents.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<ConnectionId, RegisteredAgent>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits an agent, or updates capabilities on an idempotent
    /// re-registration from the same connection.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicateId`] if the id is live on another
    ///   connection.
    /// - [`RegistryError::AlreadyRegistered`] if this connection tries to
    ///   change its id or role.
    pub fn register(
        &mut self,
        conn_id: ConnectionId,
        sender: mpsc::Sender<BridgeMessage>,
        agent_id: String,
        role: AgentRole,
        capabilities: Vec<String>,
    ) -> Result<RegisterOutcome, RegistryError> {
        if let Some(existing) = self.agents.get_mut(&conn_id) {
            if existing.agent_id == agent_id && existing.role == role {
                existing.capabilities = capabilities;
                return Ok(RegisterOutcome::Updated);
            }
            return Err(RegistryError::AlreadyRegistered(existing.agent_id.clone()));
        }

        if self.agents.values().any(|a| a.agent_id == agent_id) {
            return Err(RegistryError::DuplicateId(agent_id));
        }

        self.agents.insert(
            conn_id,
            RegisteredAgent {
                conn_id,
                agent_id,
                role,
                capabilities,
                sender,
            },
        );
        Ok(RegisterOutcome::Registered)
    }

    /// Removes the agent bound to a connection. No-op when none is found.
    pub fn remove(&mut self, conn_id: ConnectionId) -> Option<RegisteredAgent> {
        self.agents.remove(&conn_id)
    }

    /// Looks up an agent by its registered id.
    #[must_use]
    pub fn by_id(&self, agent_id: &str) -> Option<&RegisteredAgent> {
        self.agents.values().find(|a| a.agent_id == agent_id)
    }

    /// Returns every agent currently holding a role. Roles are not unique.
    #[must_use]
    pub fn by_role(&self, role: AgentRole) -> Vec<&RegisteredAgent> {
        self.agents.values().filter(|a| a.role == role).collect()
    }

    /// Returns the agent bound to a connection.
    #[must_use]
    pub fn by_connection(&self, conn_id: ConnectionId) -> Option<&RegisteredAgent> {
        self.agents.get(&conn_id)
    }

    /// Roster used to build a `StateSnapshot`.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AgentSummary> {
        let mut roster: Vec<AgentSummary> = self
            .agents
            .values()
            .map(|a| AgentSummary {
                id: a.agent_id.clone(),
                role: a.role,
                status: AgentStatus::Active,
            })
            .collect();
        // HashMap iteration order is arbitrary; keep the roster stable.
        roster.sort_by(|a, b| a.id.cmp(&b.id));
        roster
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agent is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Outbound queue sender for a connection.
    #[must_use]
    pub fn sender_of(&self, conn_id: ConnectionId) -> Option<&mpsc::Sender<BridgeMessage>> {
        self.agents.get(&conn_id).map(|a| &a.sender)
    }

    /// Connection carrying the given agent id, if registered.
    #[must_use]
    pub fn connection_of(&self, agent_id: &str) -> Option<ConnectionId> {
        self.by_id(agent_id).map(|a| a.conn_id)
    }

    /// Every connection except the given one.
    #[must_use]
    pub fn connections_except(&self, excluded: ConnectionId) -> Vec<ConnectionId> {
        self.agents
            .keys()
            .copied()
            .filter(|c| *c != excluded)
            .collect()
    }

    /// Every connection holding a role, except the given one.
    #[must_use]
    pub fn role_connections_except(
        &self,
        role: AgentRole,
        excluded: ConnectionId,
    ) -> Vec<ConnectionId> {
        self.agents
            .values()
            .filter(|a| a.role == role && a.conn_id != excluded)
            .map(|a| a.conn_id)
            .collect()
    }
}
