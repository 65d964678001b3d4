//! Integration test for the full question/answer flow: id assignment,
//! role fan-out, answer correlation, and answer-once semantics.
//!
//! Verification command: `cargo test --test question_answer`

use std::time::Duration;

use tokio::sync::mpsc;

use mentorlink_bridge::bridge;
use mentorlink_client::AgentClient;
use mentorlink_proto::agent::AgentRole;
use mentorlink_proto::message::{BridgeMessage, EventKind, QuestionId};

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

/// Destructures a routed question or panics.
fn as_question(msg: BridgeMessage) -> (QuestionId, String, bool) {
    match msg {
        BridgeMessage::Question {
            id,
            question,
            contextual,
            ..
        } => (id, question, contextual),
        other => panic!("expected Question, got {other:?}"),
    }
}

// =============================================================================
// The three-agent session scenario
// =============================================================================

#[tokio::test]
async fn question_is_answered_once_and_observed_by_all() {
    let (url, _handle) = start_bridge().await;

    // Connect in order: coding agent, teaching agent, student.
    let coder = join_session(&url, "coder", AgentRole::CodingAgent).await;
    let mentor = join_session(&url, "mentor", AgentRole::TeachingAgent).await;
    let learner = join_session(&url, "learner", AgentRole::Student).await;

    let mut coder_questions = forward(&coder, EventKind::Question);
    let mut mentor_questions = forward(&mentor, EventKind::Question);
    let mut learner_questions = forward(&learner, EventKind::Question);
    let mut coder_answers = forward(&coder, EventKind::Answer);
    let mut mentor_answers = forward(&mentor, EventKind::Answer);
    let mut learner_answers = forward(&learner, EventKind::Answer);

    // The student asks; the bridge assigns the id.
    learner
        .ask_question("why hash passwords?", None)
        .await
        .expect("ask");

    let (mentor_id, question, mentor_ctx) = as_question(recv(&mut mentor_questions).await);
    assert_eq!(question, "why hash passwords?");
    assert!(!mentor_ctx);

    let (coder_id, _, coder_ctx) = as_question(recv(&mut coder_questions).await);
    assert_eq!(mentor_id, coder_id, "both copies carry the same id");
    assert!(coder_ctx, "the coding agent's copy is tagged contextual");

    // The teaching agent answers; the coding agent and the original asker
    // both observe the answer, with the original question attached.
    mentor
        .answer_question(mentor_id, "so a database leak does not leak credentials")
        .await
        .expect("answer");

    for answers in [&mut coder_answers, &mut learner_answers] {
        match recv(answers).await {
            BridgeMessage::Answer {
                question_id,
                from,
                answer,
                question,
                ..
            } => {
                assert_eq!(question_id, mentor_id);
                assert_eq!(from, "mentor");
                assert_eq!(answer, "so a database leak does not leak credentials");
                assert_eq!(question.as_deref(), Some("why hash passwords?"));
            }
            other => panic!("expected Answer, got {other:?}"),
        }
    }

    // Answering the same id again finds no pending entry: delivery still
    // happens, but without the original question attached.
    coder
        .answer_question(coder_id, "me too")
        .await
        .expect("answer again");

    match recv(&mut learner_answers).await {
        BridgeMessage::Answer {
            question_id,
            from,
            question,
            ..
        } => {
            assert_eq!(question_id, coder_id);
            assert_eq!(from, "coder");
            assert_eq!(question, None, "the pending entry was already consumed");
        }
        other => panic!("expected Answer, got {other:?}"),
    }

    // The mentor hears the second answer; that it is the mentor's first
    // inbound answer also proves its own answer was never echoed back.
    match recv(&mut mentor_answers).await {
        BridgeMessage::Answer { from, question, .. } => {
            assert_eq!(from, "coder");
            assert_eq!(question, None);
        }
        other => panic!("expected Answer, got {other:?}"),
    }

    // The student never saw its own question.
    assert!(learner_questions.try_recv().is_err());
}

#[tokio::test]
async fn concurrent_questions_get_distinct_ids() {
    let (url, _handle) = start_bridge().await;

    let mentor = join_session(&url, "mentor", AgentRole::TeachingAgent).await;
    let asker_a = join_session(&url, "asker-a", AgentRole::Student).await;
    let asker_b = join_session(&url, "asker-b", AgentRole::Student).await;
    let mut questions = forward(&mentor, EventKind::Question);

    // Fire both without awaiting in between; the bridge serializes them.
    let (first, second) = tokio::join!(
        asker_a.ask_question("what is ownership?", None),
        asker_b.ask_question("what is borrowing?", None),
    );
    first.expect("ask a");
    second.expect("ask b");

    let (id_one, _, _) = as_question(recv(&mut questions).await);
    let (id_two, _, _) = as_question(recv(&mut questions).await);
    assert_ne!(id_one, id_two);
}

#[tokio::test]
async fn answer_to_never_asked_question_still_delivers() {
    let (url, _handle) = start_bridge().await;

    let mentor = join_session(&url, "mentor", AgentRole::TeachingAgent).await;
    let learner = join_session(&url, "learner", AgentRole::Student).await;
    let mut answers = forward(&learner, EventKind::Answer);

    // An id the bridge never assigned: correlation fails, delivery doesn't.
    mentor
        .answer_question(QuestionId::new(), "answering the void")
        .await
        .expect("answer");

    match recv(&mut answers).await {
        BridgeMessage::Answer {
            answer, question, ..
        } => {
            assert_eq!(answer, "answering the void");
            assert_eq!(question, None);
        }
        other => panic!("expected Answer, got {other:?}"),
    }
}
