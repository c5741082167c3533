//! Integration tests for WebSocket session events.
//!
//! These tests connect real WebSocket clients to the local API and check
//! that controller activity is streamed to them in order.

mod fake_backend;

use std::time::Duration;

use fake_backend::FakeBackend;
use futures::{SinkExt, StreamExt};
use mastery_session::{create_router, AppState, Operation, SessionController, SessionEvent, Stage};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serves the local API for `controller` and returns the WebSocket URL.
async fn spawn_test_server(backend: &FakeBackend, controller: SessionController) -> String {
    let router = create_router(AppState::new(backend.config(), controller));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    format!("ws://{addr}/ws")
}

/// Connects a client and consumes its `connected` event.
async fn connect_client(url: &str) -> (WsClient, SessionEvent) {
    let (mut client, _) = connect_async(url)
        .await
        .expect("Failed to connect to WebSocket");
    let first = receive_event(&mut client).await;
    (client, first)
}

/// Receives the next text message and parses it as a `SessionEvent`.
/// Answers pings along the way.
async fn receive_event(client: &mut WsClient) -> SessionEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            other => {
                assert!(
                    matches!(other, Message::Pong(_)),
                    "Expected text message, got: {other:?}"
                );
            }
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A new client first receives the current session state.
#[tokio::test]
async fn test_connected_event_carries_state() {
    let backend = FakeBackend::start(3, 80).await;
    let controller = backend.controller();
    controller
        .start_learning("Deep Learning")
        .await
        .expect("start_learning failed");

    let url = spawn_test_server(&backend, controller).await;
    let (_client, event) = connect_client(&url).await;

    let SessionEvent::Connected(payload) = event else {
        unreachable!("Expected Connected event");
    };
    assert_eq!(payload.state.stage, Stage::Explanation);
    assert_eq!(payload.state.topic.as_deref(), Some("Deep Learning"));
    assert_eq!(
        payload.state.explanation,
        "Deep Learning is a fascinating subject."
    );
}

// ============================================================================
// Event streaming
// ============================================================================

/// Learning and quiz generation are streamed step by step.
#[tokio::test]
async fn test_session_events_stream_in_order() {
    let backend = FakeBackend::start(5, 64).await;
    let controller = backend.controller();
    let url = spawn_test_server(&backend, controller.clone()).await;
    let (mut client, _) = connect_client(&url).await;

    controller
        .start_learning("Computer Vision")
        .await
        .expect("start_learning failed");
    controller.start_quiz().await.expect("start_quiz failed");
    controller.record_answer(0, 3).await.expect("record_answer");

    let mut events = Vec::new();
    for _ in 0..6 {
        events.push(receive_event(&mut client).await);
    }

    assert!(matches!(
        &events[0],
        SessionEvent::OperationStarted(p)
            if p.operation == Operation::StartLearning && p.topic == "Computer Vision"
    ));
    assert!(matches!(
        &events[1],
        SessionEvent::StageChanged(p)
            if p.from == Stage::TopicSelection && p.to == Stage::Explanation
    ));
    assert!(matches!(
        &events[2],
        SessionEvent::OperationStarted(p) if p.operation == Operation::StartQuiz
    ));
    assert!(matches!(
        &events[3],
        SessionEvent::QuizReady(p) if p.question_count == 5 && p.relevance_score == 64
    ));
    assert!(matches!(
        &events[4],
        SessionEvent::StageChanged(p) if p.to == Stage::Quiz
    ));
    assert!(matches!(
        &events[5],
        SessionEvent::AnswerRecorded(p) if p.question == 0 && p.option == 3 && p.unanswered == 4
    ));
}

/// Grading a failing quiz reports the result and that a reteach is available.
#[tokio::test]
async fn test_evaluated_event_reports_reteach() {
    let backend = FakeBackend::start(1, 90).await;
    backend.push_evaluation(0, 2, false);
    let controller = backend.controller();
    let url = spawn_test_server(&backend, controller.clone()).await;

    controller.start_learning("Transformers").await.expect("learn");
    controller.start_quiz().await.expect("quiz");
    controller.record_answer(0, 1).await.expect("answer");

    let (mut client, _) = connect_client(&url).await;
    controller.submit_quiz().await.expect("submit");

    let started = receive_event(&mut client).await;
    assert_eq!(started.event_name(), "operation_started");

    let SessionEvent::Evaluated(payload) = receive_event(&mut client).await else {
        unreachable!("Expected Evaluated event");
    };
    assert_eq!(payload.topic, "Transformers");
    assert_eq!(payload.result.attempt_number, 2);
    assert!(!payload.passed);
    assert!(payload.retaught);

    let changed = receive_event(&mut client).await;
    assert!(matches!(changed, SessionEvent::StageChanged(p) if p.to == Stage::Result));
}

/// Rejected input is announced as a failed operation.
#[tokio::test]
async fn test_rejected_operation_is_broadcast() {
    let backend = FakeBackend::start(1, 90).await;
    let controller = backend.controller();
    let url = spawn_test_server(&backend, controller.clone()).await;
    let (mut client, _) = connect_client(&url).await;

    assert!(controller.start_learning("   ").await.is_err());

    let SessionEvent::OperationFailed(payload) = receive_event(&mut client).await else {
        unreachable!("Expected OperationFailed event");
    };
    assert_eq!(payload.operation, Operation::StartLearning);
    assert_eq!(payload.message, "Please select or enter a topic");
}

/// Every connected client sees the same events.
#[tokio::test]
async fn test_reset_reaches_all_clients() {
    let backend = FakeBackend::start(1, 90).await;
    let controller = backend.controller();
    let url = spawn_test_server(&backend, controller.clone()).await;

    let (mut first, _) = connect_client(&url).await;
    let (mut second, _) = connect_client(&url).await;

    controller.reset().await;

    assert_eq!(receive_event(&mut first).await.event_name(), "session_reset");
    assert_eq!(receive_event(&mut second).await.event_name(), "session_reset");
}
