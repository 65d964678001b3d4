//! WebSocket client for the `MentorLink` bridge.
//!
//! [`AgentClient`] connects to the bridge, registers an identity, and
//! dispatches inbound messages to per-kind handlers from a background
//! reader task. Sends are fire-and-forget: the protocol has no
//! acknowledgments, so nothing is awaited beyond the socket write.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use mentorlink_proto::agent::AgentRole;
use mentorlink_proto::codec;
use mentorlink_proto::message::{AgentMessage, BridgeMessage, EventKind, QuestionId};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Inbound message callback. Handlers run on the reader task and should
/// stay lightweight; push into a channel for anything slow.
type Handler = Arc<dyn Fn(BridgeMessage) + Send + Sync>;

/// Single handler per message kind, last registration wins.
type HandlerMap = RwLock<HashMap<EventKind, Handler>>;

/// Default timeout for connecting to the bridge.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors surfaced by the [`AgentClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The bridge URL could not be parsed or uses an unsupported scheme.
    #[error("invalid bridge url: {0}")]
    InvalidUrl(String),

    /// The connection attempt timed out.
    #[error("connection attempt timed out")]
    Timeout,

    /// The bridge endpoint could not be reached.
    #[error("bridge unreachable: {0}")]
    Unreachable(String),

    /// A transport-level I/O failure.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection to the bridge is gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// `register` was already called on this connection.
    #[error("already registered on this connection")]
    AlreadyRegistered,

    /// A send was attempted before `register`.
    #[error("register before sending messages")]
    NotRegistered,

    /// Message serialization failed.
    #[error(transparent)]
    Codec(#[from] mentorlink_proto::codec::CodecError),
}

/// A participant's connection to the bridge.
///
/// Used identically by every role. Typical lifecycle:
///
/// 1. [`connect`](Self::connect) to the bridge endpoint.
/// 2. [`on_message`](Self::on_message) for each kind of interest
///    (including [`EventKind::StateSnapshot`] to catch the replay).
/// 3. [`register`](Self::register) exactly once.
/// 4. Exchange messages via the convenience senders.
pub struct AgentClient {
    /// The bridge URL this client connected to.
    bridge_url: String,
    /// Write half of the WebSocket connection (shared for concurrent sends).
    ws_sender: Arc<Mutex<WsSender>>,
    /// Per-kind inbound handlers, dispatched by the reader task.
    handlers: Arc<HandlerMap>,
    /// Whether the WebSocket connection to the bridge is active.
    connected: Arc<AtomicBool>,
    /// Whether `register` has been sent on this connection.
    registered: AtomicBool,
    /// Handle to the background reader task.
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl AgentClient {
    /// Connects to a bridge at `bridge_url` (a `ws://` or `wss://` URL).
    ///
    /// Spawns a background task that reads inbound messages and dispatches
    /// them to the handlers registered via [`on_message`](Self::on_message).
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidUrl`] for an unparseable or non-WebSocket URL.
    /// - [`ClientError::Timeout`] if the connection attempt times out.
    /// - [`ClientError::Unreachable`] if the endpoint refuses or cannot be
    ///   resolved.
    /// - [`ClientError::Io`] for other transport failures.
    pub async fn connect(bridge_url: &str) -> Result<Self, ClientError> {
        let parsed =
            url::Url::parse(bridge_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme {:?}",
                parsed.scheme()
            )));
        }

        let (ws_stream, _response) =
            tokio::time::timeout(CONNECT_TIMEOUT, connect_async(bridge_url))
                .await
                .map_err(|_| {
                    tracing::warn!(url = bridge_url, "bridge connect timed out");
                    ClientError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = bridge_url, error = %e, "bridge connect failed");
                    map_ws_connect_error(e)
                })?;

        let (ws_sender, ws_reader) = ws_stream.split();
        let handlers: Arc<HandlerMap> = Arc::new(RwLock::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let reader_handle = tokio::spawn(reader_loop(
            ws_reader,
            Arc::clone(&handlers),
            Arc::clone(&connected),
        ));

        Ok(Self {
            bridge_url: bridge_url.to_string(),
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            handlers,
            connected,
            registered: AtomicBool::new(false),
            _reader_handle: reader_handle,
        })
    }

    /// Registers this participant's identity with the bridge.
    ///
    /// Must be called exactly once per connection, before any other send.
    /// The bridge replies with a `StateSnapshot`, delivered through the
    /// [`EventKind::StateSnapshot`] handler.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AlreadyRegistered`] on a second call.
    /// - [`ClientError::ConnectionClosed`] if the connection is gone.
    pub async fn register(
        &self,
        agent_id: &str,
        role: AgentRole,
        capabilities: Vec<String>,
    ) -> Result<(), ClientError> {
        if self.registered.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyRegistered);
        }
        self.send_raw(&AgentMessage::Register {
            agent_id: agent_id.to_string(),
            role,
            capabilities,
        })
        .await
    }

    /// Sends a message, fire-and-forget. No acknowledgment is awaited.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotRegistered`] before [`register`](Self::register).
    /// - [`ClientError::ConnectionClosed`] if the connection is gone.
    pub async fn send(&self, message: AgentMessage) -> Result<(), ClientError> {
        if !self.registered.load(Ordering::SeqCst) {
            return Err(ClientError::NotRegistered);
        }
        self.send_raw(&message).await
    }

    /// Registers the handler for one kind of inbound message.
    ///
    /// A single handler is kept per kind: registering again replaces the
    /// previous handler (last registration wins). Handlers run on the
    /// reader task.
    pub fn on_message<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(BridgeMessage) + Send + Sync + 'static,
    {
        self.handlers.write().insert(kind, Arc::new(handler));
    }

    /// Sends a broadcast chat message.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_chat(&self, content: &str) -> Result<(), ClientError> {
        self.send(AgentMessage::Chat {
            content: content.to_string(),
            to: None,
        })
        .await
    }

    /// Sends a chat message to one specific agent.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_chat_to(&self, content: &str, to: &str) -> Result<(), ClientError> {
        self.send(AgentMessage::Chat {
            content: content.to_string(),
            to: Some(to.to_string()),
        })
        .await
    }

    /// Sends a status update.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_status(
        &self,
        action: &str,
        details: &str,
        important: bool,
    ) -> Result<(), ClientError> {
        self.send(AgentMessage::Status {
            action: action.to_string(),
            details: details.to_string(),
            important,
        })
        .await
    }

    /// Asks a question. The bridge assigns the id; it arrives on the
    /// routed copies, not as a reply to this call.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn ask_question(
        &self,
        question: &str,
        context: Option<&str>,
    ) -> Result<(), ClientError> {
        self.send(AgentMessage::Question {
            question: question.to_string(),
            context: context.map(str::to_string),
        })
        .await
    }

    /// Answers a previously routed question.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn answer_question(
        &self,
        question_id: QuestionId,
        answer: &str,
    ) -> Result<(), ClientError> {
        self.send(AgentMessage::Answer {
            question_id,
            answer: answer.to_string(),
        })
        .await
    }

    /// Closes the connection with a WebSocket close frame.
    ///
    /// Idempotent; the bridge treats the close as a disconnect and
    /// announces `AgentLeft` to the remaining participants.
    pub async fn close(&self) {
        let mut sender = self.ws_sender.lock().await;
        let _ = sender.send(Message::Close(None)).await;
        let _ = sender.flush().await;
        self.connected.store(false, Ordering::Relaxed);
    }

    /// Whether the connection to the bridge is still active.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// The bridge URL this client connected to.
    #[must_use]
    pub fn bridge_url(&self) -> &str {
        &self.bridge_url
    }

    /// Encodes and writes a message on the socket.
    async fn send_raw(&self, message: &AgentMessage) -> Result<(), ClientError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(ClientError::ConnectionClosed);
        }
        let text = codec::encode(message)?;

        let mut sender = self.ws_sender.lock().await;
        sender.send(Message::Text(text.into())).await.map_err(|e| {
            tracing::warn!(error = %e, "bridge send failed");
            self.connected.store(false, Ordering::Relaxed);
            ClientError::ConnectionClosed
        })?;
        Ok(())
    }
}

/// Background task that reads bridge messages and dispatches them.
///
/// Malformed frames are logged and skipped; the task does not disconnect
/// on bad data. A message kind without a registered handler is dropped
/// with a debug log. Sets `connected` to `false` when the socket closes.
async fn reader_loop(mut ws_reader: WsReader, handlers: Arc<HandlerMap>, connected: Arc<AtomicBool>) {
    while let Some(frame) = ws_reader.next().await {
        match frame {
            Ok(Message::Text(text)) => match codec::decode::<BridgeMessage>(text.as_str()) {
                Ok(msg) => {
                    let kind = msg.kind();
                    // Clone the handler out so a callback can re-register
                    // without deadlocking against the map lock.
                    let handler = handlers.read().get(&kind).cloned();
                    if let Some(handler) = handler {
                        handler(msg);
                    } else {
                        tracing::debug!(?kind, "no handler registered, dropping message");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "malformed bridge frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("bridge closed the connection");
                break;
            }
            Ok(_) => {
                // Binary, ping, and pong frames are ignored.
            }
            Err(e) => {
                tracing::warn!(error = %e, "bridge read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::debug!("bridge reader task exiting");
}

/// Maps a `tokio_tungstenite` connection error to a [`ClientError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error) -> ClientError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused
                || io_err.kind() == std::io::ErrorKind::AddrNotAvailable
            {
                ClientError::Unreachable(io_err.to_string())
            } else {
                ClientError::Io(io_err)
            }
        }
        WsError::Http(response) => {
            ClientError::Unreachable(format!("bridge HTTP error: status {}", response.status()))
        }
        other => ClientError::Unreachable(format!("bridge connection error: {other}")),
    }
}
