//! Integration tests for the routing rules: broadcast exclusion, directed
//! delivery, important-status escalation, and the student-question policy.
//!
//! Verification command: `cargo test --test routing_rules`

use std::time::Duration;

use tokio::sync::mpsc;

use mentorlink_bridge::bridge;
use mentorlink_client::AgentClient;
use mentorlink_proto::agent::AgentRole;
use mentorlink_proto::message::{BridgeMessage, EventKind};

// =============================================================================
// Test helpers
// =============================================================================

/// Starts a bridge on an OS-assigned port and returns its ws:// URL.
async fn start_bridge() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = bridge::start_server("127.0.0.1:0")
        .await
        .expect("start bridge");
    (format!("ws://{addr}/ws"), handle)
}

/// Registers a channel-forwarding handler for one message kind.
fn forward(client: &AgentClient, kind: EventKind) -> mpsc::UnboundedReceiver<BridgeMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.on_message(kind, move |msg| {
        let _ = tx.send(msg);
    });
    rx
}

/// Receives one message with a timeout.
async fn recv(rx: &mut mpsc::UnboundedReceiver<BridgeMessage>) -> BridgeMessage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("recv timed out")
        .expect("channel closed")
}

/// Connects and registers, consuming the state snapshot.
async fn join_session(url: &str, agent_id: &str, role: AgentRole) -> AgentClient {
    let client = AgentClient::connect(url).await.expect("connect");
    let mut snapshots = forward(&client, EventKind::StateSnapshot);
    client
        .register(agent_id, role, vec![])
        .await
        .expect("register");
    let snapshot = recv(&mut snapshots).await;
    assert!(matches!(snapshot, BridgeMessage::StateSnapshot { .. }));
    client
}

/// Extracts the chat content or panics.
fn chat_content(msg: BridgeMessage) -> String {
    match msg {
        BridgeMessage::Chat { content, .. } => content,
        other => panic!("expected Chat, got {other:?}"),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn broadcast_chat_reaches_everyone_but_the_sender() {
    let (url, _handle) = start_bridge().await;

    let a = join_session(&url, "a", AgentRole::CodingAgent).await;
    let b = join_session(&url, "b", AgentRole::TeachingAgent).await;
    let mut a_chats = forward(&a, EventKind::Chat);
    let mut b_chats = forward(&b, EventKind::Chat);

    a.send_chat("from a").await.expect("send");
    assert_eq!(chat_content(recv(&mut b_chats).await), "from a");

    // a never hears its own broadcast: the first chat a receives is b's
    // reply, which the bridge processed after a's own message.
    b.send_chat("from b").await.expect("send");
    assert_eq!(chat_content(recv(&mut a_chats).await), "from b");
}

#[tokio::test]
async fn directed_chat_reaches_only_the_addressee() {
    let (url, _handle) = start_bridge().await;

    let a = join_session(&url, "a", AgentRole::CodingAgent).await;
    let b = join_session(&url, "b", AgentRole::TeachingAgent).await;
    let c = join_session(&url, "c", AgentRole::Student).await;
    let mut b_chats = forward(&b, EventKind::Chat);
    let mut c_chats = forward(&c, EventKind::Chat);

    a.send_chat_to("for c only", "c").await.expect("send");
    // The broadcast marker is routed after the directed chat, so if b had
    // been sent the directed message it would arrive first.
    a.send_chat("marker").await.expect("send");

    match recv(&mut c_chats).await {
        BridgeMessage::Chat { content, to, .. } => {
            assert_eq!(content, "for c only");
            assert_eq!(to.as_deref(), Some("c"));
        }
        other => panic!("expected Chat, got {other:?}"),
    }
    assert_eq!(chat_content(recv(&mut c_chats).await), "marker");

    assert_eq!(chat_content(recv(&mut b_chats).await), "marker");
}

#[tokio::test]
async fn directed_chat_to_unknown_agent_is_silently_dropped() {
    let (url, _handle) = start_bridge().await;

    let a = join_session(&url, "a", AgentRole::CodingAgent).await;
    let b = join_session(&url, "b", AgentRole::TeachingAgent).await;
    let mut a_errors = forward(&a, EventKind::Error);
    let mut b_chats = forward(&b, EventKind::Chat);

    a.send_chat_to("anyone there?", "ghost").await.expect("send");
    a.send_chat("marker").await.expect("send");

    // Nobody receives the directed chat and no error surfaces to a.
    assert_eq!(chat_content(recv(&mut b_chats).await), "marker");
    assert!(a_errors.try_recv().is_err(), "drop must be silent");
}

#[tokio::test]
async fn important_status_reaches_teaching_agents() {
    let (url, _handle) = start_bridge().await;

    let coder = join_session(&url, "coder", AgentRole::CodingAgent).await;
    let mentor = join_session(&url, "mentor", AgentRole::TeachingAgent).await;
    let learner = join_session(&url, "learner", AgentRole::Student).await;
    let mut mentor_statuses = forward(&mentor, EventKind::Status);
    let mut learner_statuses = forward(&learner, EventKind::Status);

    coder
        .send_status("rewriting", "auth module touched", true)
        .await
        .expect("send");

    for statuses in [&mut mentor_statuses, &mut learner_statuses] {
        match recv(statuses).await {
            BridgeMessage::Status {
                from,
                action,
                important,
                ..
            } => {
                assert_eq!(from, "coder");
                assert_eq!(action, "rewriting");
                assert!(important);
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    // An escalated status must not arrive twice at the teaching agent.
    coder
        .send_status("done", "auth module saved", false)
        .await
        .expect("send");
    match recv(&mut mentor_statuses).await {
        BridgeMessage::Status { action, .. } => assert_eq!(action, "done"),
        other => panic!("expected the follow-up Status, got {other:?}"),
    }
}

#[tokio::test]
async fn student_question_skips_other_students() {
    let (url, _handle) = start_bridge().await;

    let coder = join_session(&url, "coder", AgentRole::CodingAgent).await;
    let mentor = join_session(&url, "mentor", AgentRole::TeachingAgent).await;
    let asker = join_session(&url, "asker", AgentRole::Student).await;
    let bystander = join_session(&url, "bystander", AgentRole::Student).await;

    let mut coder_questions = forward(&coder, EventKind::Question);
    let mut mentor_questions = forward(&mentor, EventKind::Question);
    let mut asker_questions = forward(&asker, EventKind::Question);
    let mut bystander_questions = forward(&bystander, EventKind::Question);
    let mut bystander_chats = forward(&bystander, EventKind::Chat);

    asker
        .ask_question("why hash passwords?", None)
        .await
        .expect("ask");

    // The teaching agent gets the plain copy, the coding agent the
    // contextual one, both under the same bridge-assigned id.
    let mentor_copy = recv(&mut mentor_questions).await;
    let coder_copy = recv(&mut coder_questions).await;
    match (mentor_copy, coder_copy) {
        (
            BridgeMessage::Question {
                id: mentor_id,
                from,
                from_role,
                contextual: mentor_ctx,
                ..
            },
            BridgeMessage::Question {
                id: coder_id,
                contextual: coder_ctx,
                ..
            },
        ) => {
            assert_eq!(from, "asker");
            assert_eq!(from_role, AgentRole::Student);
            assert_eq!(mentor_id, coder_id);
            assert!(!mentor_ctx);
            assert!(coder_ctx);
        }
        other => panic!("expected two Questions, got {other:?}"),
    }

    // The marker broadcast is processed after the question, so once the
    // bystander sees it, the question can no longer be in flight.
    mentor.send_chat("marker").await.expect("send");
    assert_eq!(chat_content(recv(&mut bystander_chats).await), "marker");
    assert!(
        bystander_questions.try_recv().is_err(),
        "students must not see other students' questions"
    );
    assert!(
        asker_questions.try_recv().is_err(),
        "the asker must not receive its own question"
    );
}

#[tokio::test]
async fn question_from_teaching_agent_is_plain_broadcast() {
    let (url, _handle) = start_bridge().await;

    let mentor = join_session(&url, "mentor", AgentRole::TeachingAgent).await;
    let coder = join_session(&url, "coder", AgentRole::CodingAgent).await;
    let learner = join_session(&url, "learner", AgentRole::Student).await;
    let mut coder_questions = forward(&coder, EventKind::Question);
    let mut learner_questions = forward(&learner, EventKind::Question);

    mentor
        .ask_question("what does this loop do?", Some("for x in xs {}"))
        .await
        .expect("ask");

    for questions in [&mut coder_questions, &mut learner_questions] {
        match recv(questions).await {
            BridgeMessage::Question {
                from,
                from_role,
                contextual,
                ..
            } => {
                assert_eq!(from, "mentor");
                assert_eq!(from_role, AgentRole::TeachingAgent);
                assert!(!contextual, "plain broadcast carries no contextual tag");
            }
            other => panic!("expected Question, got {other:?}"),
        }
    }
}
