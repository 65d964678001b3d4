//! Bridge server core: shared session state, WebSocket handler, connection
//! lifecycle, and message dispatch.
//!
//! The bridge accepts WebSocket connections, admits participants via a
//! `Register` handshake, replays recent conversation to each new joiner,
//! and routes subsequent messages according to [`crate::router`]. Each
//! connection moves through exactly three states: connected (not yet
//! identified), registered, closed.
//!
//! Delivery is best-effort: every connection has a bounded outbound queue
//! drained by a writer task, and a full or dead queue drops that delivery
//! rather than stalling the rest of the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};

use mentorlink_proto::agent::{AgentRole, validate_agent_id};
use mentorlink_proto::codec;
use mentorlink_proto::message::{AgentMessage, BridgeMessage};

use crate::config::BridgeConfig;
use crate::history::ConversationLog;
use crate::questions::QuestionBoard;
use crate::registry::{AgentRegistry, ConnectionId, RegisterOutcome, RegistryError};
use crate::router;

/// Default maximum allowed inbound frame size in bytes (64 KiB).
const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Default capacity of each connection's outbound queue.
const DEFAULT_OUTBOUND_QUEUE_SIZE: usize = 64;

/// Default grace period for the `Register` handshake.
const DEFAULT_REGISTER_GRACE: Duration = Duration::from_secs(10);

/// The mutable session structures, all behind one lock so registrations,
/// question opens, and broadcasts never interleave (single-writer
/// discipline).
struct Session {
    registry: AgentRegistry,
    history: ConversationLog,
    questions: QuestionBoard,
}

/// Shared bridge state: the session plus per-connection limits.
pub struct BridgeState {
    session: Mutex<Session>,
    next_conn_id: AtomicU64,
    max_payload_size: usize,
    outbound_queue_size: usize,
    register_grace: Duration,
}

impl Default for BridgeState {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeState {
    /// Creates bridge state with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: Mutex::new(Session {
                registry: AgentRegistry::new(),
                history: ConversationLog::new(),
                questions: QuestionBoard::new(),
            }),
            next_conn_id: AtomicU64::new(1),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            outbound_queue_size: DEFAULT_OUTBOUND_QUEUE_SIZE,
            register_grace: DEFAULT_REGISTER_GRACE,
        }
    }

    /// Creates bridge state from a resolved [`BridgeConfig`].
    #[must_use]
    pub fn with_config(config: &BridgeConfig) -> Self {
        Self {
            session: Mutex::new(Session {
                registry: AgentRegistry::new(),
                history: ConversationLog::with_capacity(config.history_capacity),
                questions: QuestionBoard::with_ttl(Duration::from_secs(config.question_ttl_secs)),
            }),
            next_conn_id: AtomicU64::new(1),
            max_payload_size: config.max_payload_size,
            outbound_queue_size: config.outbound_queue_size,
            register_grace: Duration::from_secs(config.register_grace_secs),
        }
    }

    /// Number of currently registered agents.
    pub async fn registered_count(&self) -> usize {
        self.session.lock().await.registry.len()
    }
}

/// Everything produced by a successful `Register` handshake.
struct Admission {
    agent_id: String,
    role: AgentRole,
    capabilities: Vec<String>,
    outbound_tx: mpsc::Sender<BridgeMessage>,
    outbound_rx: mpsc::Receiver<BridgeMessage>,
    snapshot: BridgeMessage,
}

/// Handles an upgraded WebSocket connection for a single participant.
///
/// The connection lifecycle:
/// 1. Wait for a `Register` message (grace period applies).
/// 2. Admit the agent, send it a `StateSnapshot`, announce `AgentJoined`.
/// 3. Enter the message loop, routing frames per [`crate::router`].
/// 4. On disconnect, remove the agent and announce `AgentLeft`.
pub async fn handle_socket(socket: WebSocket, state: Arc<BridgeState>) {
    let conn_id = state.next_conn_id.fetch_add(1, Ordering::Relaxed);
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some(admission) =
        wait_for_register(conn_id, &mut ws_sender, &mut ws_receiver, &state).await
    else {
        return;
    };
    let Admission {
        agent_id,
        role,
        capabilities,
        outbound_tx,
        mut outbound_rx,
        snapshot,
    } = admission;

    // Snapshot first, then the join announcement: the new agent must never
    // see its own AgentJoined in the replayed history.
    if send_direct(&mut ws_sender, &snapshot).await.is_err() {
        tracing::warn!(conn_id, agent_id = %agent_id, "failed to send state snapshot");
        state.session.lock().await.registry.remove(conn_id);
        return;
    }

    {
        let mut session = state.session.lock().await;
        let session = &mut *session;
        let joined = BridgeMessage::AgentJoined {
            agent_id: agent_id.clone(),
            role,
            capabilities,
        };
        route_and_deliver(session, conn_id, joined);
    }

    // Writer task: drains the bounded outbound queue onto the socket.
    let writer_agent_id = agent_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let text = match codec::encode(&msg) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode outbound message");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                tracing::warn!(agent_id = %writer_agent_id, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: frames from this connection are processed strictly in
    // arrival order.
    loop {
        tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(conn_id, text.as_str(), &outbound_tx, &state).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {
                    // Binary, ping, and pong frames are ignored.
                }
                Some(Err(e)) => {
                    tracing::warn!(conn_id, error = %e, "WebSocket read error");
                    break;
                }
            },
            _ = &mut write_task => break,
        }
    }
    write_task.abort();

    let mut session = state.session.lock().await;
    let session = &mut *session;
    if let Some(agent) = session.registry.remove(conn_id) {
        let left = BridgeMessage::AgentLeft {
            agent_id: agent.agent_id.clone(),
        };
        route_and_deliver(session, conn_id, left);
        tracing::info!(conn_id, agent_id = %agent.agent_id, "agent disconnected");
    }
}

/// Waits for a valid `Register` on a fresh connection.
///
/// Anything else received in the meantime is answered with a
/// `not_registered` error and discarded; the connection stays open so the
/// client may retry. A duplicate agent id closes the connection. Returns
/// `None` when the connection closed, timed out, or was rejected.
async fn wait_for_register(
    conn_id: ConnectionId,
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    ws_receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    state: &BridgeState,
) -> Option<Admission> {
    let deadline = tokio::time::Instant::now() + state.register_grace;

    loop {
        let frame = match tokio::time::timeout_at(deadline, ws_receiver.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                tracing::warn!(conn_id, error = %e, "WebSocket error before registration");
                return None;
            }
            Ok(None) => return None,
            Err(_elapsed) => {
                tracing::info!(conn_id, "no Register within grace period, closing");
                let _ = ws_sender.send(Message::Close(None)).await;
                return None;
            }
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => return None,
            _ => continue,
        };

        if text.len() > state.max_payload_size {
            let reply = error_frame(
                "payload_too_large",
                format!(
                    "frame of {} bytes exceeds the {} byte limit",
                    text.len(),
                    state.max_payload_size
                ),
            );
            let _ = send_direct(ws_sender, &reply).await;
            continue;
        }

        let msg = match codec::decode::<AgentMessage>(text.as_str()) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(conn_id, error = %e, "failed to decode registration frame");
                let reply = error_frame("malformed_message", e.to_string());
                let _ = send_direct(ws_sender, &reply).await;
                continue;
            }
        };

        let AgentMessage::Register {
            agent_id,
            role,
            capabilities,
        } = msg
        else {
            tracing::debug!(conn_id, "message before Register rejected");
            let reply = error_frame(
                "not_registered",
                "register before sending messages".to_string(),
            );
            let _ = send_direct(ws_sender, &reply).await;
            continue;
        };

        let agent_id = match validate_agent_id(&agent_id) {
            Ok(id) => id,
            Err(e) => {
                let reply = error_frame("invalid_agent_id", e.to_string());
                let _ = send_direct(ws_sender, &reply).await;
                continue;
            }
        };

        let (tx, rx) = mpsc::channel(state.outbound_queue_size);
        let mut session = state.session.lock().await;
        match session.registry.register(
            conn_id,
            tx.clone(),
            agent_id.clone(),
            role,
            capabilities.clone(),
        ) {
            Ok(RegisterOutcome::Registered) => {
                let snapshot = BridgeMessage::StateSnapshot {
                    agents: session.registry.snapshot(),
                    recent_conversation: session.history.recent(session.history.capacity()),
                };
                drop(session);
                tracing::info!(conn_id, agent_id = %agent_id, role = %role, "agent registered");
                return Some(Admission {
                    agent_id,
                    role,
                    capabilities,
                    outbound_tx: tx,
                    outbound_rx: rx,
                    snapshot,
                });
            }
            // A fresh connection is not in the registry, so only the
            // duplicate-id failure can happen here.
            Ok(RegisterOutcome::Updated) | Err(RegistryError::AlreadyRegistered(_)) => {
                drop(session);
            }
            Err(RegistryError::DuplicateId(id)) => {
                drop(session);
                tracing::warn!(conn_id, agent_id = %id, "duplicate agent id, closing connection");
                let reply = error_frame(
                    "duplicate_id",
                    format!("agent id {id:?} is already connected"),
                );
                let _ = send_direct(ws_sender, &reply).await;
                let _ = ws_sender.send(Message::Close(None)).await;
                return None;
            }
        }
    }
}

/// Handles one text frame from a registered connection.
async fn handle_frame(
    conn_id: ConnectionId,
    text: &str,
    reply: &mpsc::Sender<BridgeMessage>,
    state: &BridgeState,
) {
    if text.len() > state.max_payload_size {
        tracing::warn!(
            conn_id,
            size = text.len(),
            max = state.max_payload_size,
            "frame exceeds size limit"
        );
        send_error(
            reply,
            "payload_too_large",
            format!(
                "frame of {} bytes exceeds the {} byte limit",
                text.len(),
                state.max_payload_size
            ),
        );
        return;
    }

    let msg = match codec::decode::<AgentMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(conn_id, error = %e, "failed to decode message");
            send_error(reply, "malformed_message", e.to_string());
            return;
        }
    };

    let mut session = state.session.lock().await;
    let session = &mut *session;
    let Some(sender) = session.registry.by_connection(conn_id) else {
        // The connection raced its own teardown; nothing to do.
        return;
    };
    let from = sender.agent_id.clone();
    let from_role = sender.role;

    match msg {
        AgentMessage::Register {
            agent_id,
            role,
            capabilities,
        } => {
            let agent_id = match validate_agent_id(&agent_id) {
                Ok(id) => id,
                Err(e) => {
                    send_error(reply, "invalid_agent_id", e.to_string());
                    return;
                }
            };
            match session
                .registry
                .register(conn_id, reply.clone(), agent_id, role, capabilities)
            {
                Ok(RegisterOutcome::Updated) => {
                    tracing::debug!(conn_id, agent_id = %from, "capabilities updated");
                }
                Err(e) => {
                    tracing::warn!(conn_id, error = %e, "re-registration rejected");
                    send_error(reply, "already_registered", e.to_string());
                }
                // A registered connection can only update or be rejected.
                Ok(RegisterOutcome::Registered) => {}
            }
        }
        AgentMessage::Chat { content, to } => {
            let stamped = BridgeMessage::Chat {
                from,
                from_role,
                content,
                to,
            };
            route_and_deliver(session, conn_id, stamped);
        }
        AgentMessage::Status {
            action,
            details,
            important,
        } => {
            let stamped = BridgeMessage::Status {
                from,
                from_role,
                action,
                details,
                important,
            };
            route_and_deliver(session, conn_id, stamped);
        }
        AgentMessage::Question { question, context } => {
            let id =
                session
                    .questions
                    .open(question.clone(), context.clone(), from.clone(), from_role);
            tracing::info!(conn_id, question_id = %id, asked_by = %from, "question opened");
            let stamped = BridgeMessage::Question {
                id,
                from,
                from_role,
                question,
                context,
                contextual: false,
            };
            route_and_deliver(session, conn_id, stamped);
        }
        AgentMessage::Answer {
            question_id,
            answer,
        } => {
            // An unknown or expired id never blocks delivery; the mismatch
            // is only logged and the answer goes out without the original
            // question attached.
            let original = match session.questions.resolve(question_id) {
                Ok(pending) => Some(pending.question),
                Err(e) => {
                    tracing::warn!(conn_id, answered_by = %from, error = %e, "answer correlation failed");
                    None
                }
            };
            let stamped = BridgeMessage::Answer {
                question_id,
                from,
                from_role,
                answer,
                question: original,
            };
            route_and_deliver(session, conn_id, stamped);
        }
    }
}

/// Appends a stamped message to the conversation log, computes its route
/// plan, and delivers it best-effort.
fn route_and_deliver(session: &mut Session, sender_conn: ConnectionId, stamped: BridgeMessage) {
    session.history.append(stamped.clone());
    let plan = router::plan(&stamped, sender_conn, &session.registry);
    deliver(&session.registry, &plan.recipients, &stamped);
    if !plan.contextual.is_empty() {
        let tagged = tag_contextual(stamped);
        deliver(&session.registry, &plan.contextual, &tagged);
    }
}

/// Marks a question copy as contextual for coding-agent recipients.
fn tag_contextual(message: BridgeMessage) -> BridgeMessage {
    match message {
        BridgeMessage::Question {
            id,
            from,
            from_role,
            question,
            context,
            ..
        } => BridgeMessage::Question {
            id,
            from,
            from_role,
            question,
            context,
            contextual: true,
        },
        other => other,
    }
}

/// Best-effort fan-out to a set of connections.
///
/// A full queue means the peer is too slow; the delivery for that peer is
/// dropped and logged, and nothing is surfaced to the sender.
fn deliver(registry: &AgentRegistry, targets: &[ConnectionId], message: &BridgeMessage) {
    use tokio::sync::mpsc::error::TrySendError;

    for conn in targets {
        let Some(sender) = registry.sender_of(*conn) else {
            continue;
        };
        match sender.try_send(message.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(conn, "outbound queue full, dropping delivery");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(conn, "outbound queue closed, dropping delivery");
            }
        }
    }
}

/// Queues a connection-private error frame, best-effort.
fn send_error(reply: &mpsc::Sender<BridgeMessage>, code: &str, message: String) {
    let _ = reply.try_send(error_frame(code, message));
}

/// Builds an error frame with a machine-readable code.
fn error_frame(code: &str, message: String) -> BridgeMessage {
    BridgeMessage::Error {
        code: code.to_string(),
        message,
    }
}

/// Encodes a bridge message and sends it directly on a WebSocket sender.
async fn send_direct(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &BridgeMessage,
) -> Result<(), String> {
    let text = codec::encode(msg).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the bridge server on the given address and returns the bound
/// address and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(BridgeState::new())).await
}

/// Starts the bridge server with a pre-configured [`BridgeState`].
///
/// Use [`BridgeState::with_config`] to apply the limits from a resolved
/// [`BridgeConfig`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<BridgeState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "bridge server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<BridgeState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
