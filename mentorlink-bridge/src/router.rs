//! Role-aware recipient selection.
//!
//! Given a stamped message and the sending connection, the router computes
//! which connections receive it. It never performs delivery itself and
//! holds no state, which keeps the routing rules unit-testable against a
//! plain registry.
//!
//! Rules:
//! - directed chat goes to the addressee only, and is silently dropped if
//!   the addressee is gone;
//! - broadcast excludes the sender;
//! - an important status is escalated to every teaching agent on top of
//!   the normal broadcast;
//! - a student's question goes to teaching and coding agents only, with
//!   the coding-agent copies tagged as contextual;
//! - answers and join/leave events go to everyone but the sender.

use mentorlink_proto::agent::AgentRole;
use mentorlink_proto::message::BridgeMessage;

use crate::registry::{AgentRegistry, ConnectionId};

/// The recipient set the router picked for one message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    /// Connections that receive the message as stamped.
    pub recipients: Vec<ConnectionId>,
    /// Connections that receive the question copy tagged `contextual`.
    pub contextual: Vec<ConnectionId>,
}

impl RoutePlan {
    /// Whether the plan delivers to no one.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty() && self.contextual.is_empty()
    }
}

/// Computes the recipient set for a stamped message from `sender`.
///
/// `StateSnapshot` and `Error` are connection-private and never routed;
/// they yield an empty plan.
#[must_use]
pub fn plan(
    message: &BridgeMessage,
    sender: ConnectionId,
    registry: &AgentRegistry,
) -> RoutePlan {
    match message {
        BridgeMessage::Chat { to: Some(id), .. } => RoutePlan {
            recipients: registry.connection_of(id).into_iter().collect(),
            contextual: Vec::new(),
        },
        BridgeMessage::Chat { to: None, .. } => broadcast(sender, registry),
        BridgeMessage::Status { important, .. } => {
            let mut plan = broadcast(sender, registry);
            if *important {
                // Escalation: teaching agents are targeted explicitly, on
                // top of whatever the broadcast already covers.
                for conn in registry.role_connections_except(AgentRole::TeachingAgent, sender) {
                    if !plan.recipients.contains(&conn) {
                        plan.recipients.push(conn);
                    }
                }
            }
            plan
        }
        BridgeMessage::Question { from_role, .. } => {
            if *from_role == AgentRole::Student {
                RoutePlan {
                    recipients: registry
                        .role_connections_except(AgentRole::TeachingAgent, sender),
                    contextual: registry
                        .role_connections_except(AgentRole::CodingAgent, sender),
                }
            } else {
                broadcast(sender, registry)
            }
        }
        BridgeMessage::Answer { .. }
        | BridgeMessage::AgentJoined { .. }
        | BridgeMessage::AgentLeft { .. } => broadcast(sender, registry),
        BridgeMessage::StateSnapshot { .. } | BridgeMessage::Error { .. } => RoutePlan::default(),
    }
}

/// Everyone except the sender.
fn broadcast(sender: ConnectionId, registry: &AgentRegistry) -> RoutePlan {
    RoutePlan {
        recipients: registry.connections_except(sender),
        contextual: Vec::new(),
    }
}
