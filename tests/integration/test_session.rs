//! End-to-end tests for a learning session.
//!
//! Drives `SessionController` through `HttpGateway` against an in-process
//! fake tutoring service, and the local HTTP API on top of it.

mod fake_backend;

use std::sync::Arc;

use axum::http::StatusCode;
use fake_backend::FakeBackend;
use mastery_report::{AttemptInput, ProgressReport};
use mastery_session::{create_router, AppState, SessionController, SessionError, Stage};
use serde_json::{json, Value};

/// Learns `topic`, takes the quiz and answers every question with option 0.
async fn answer_quiz(controller: &SessionController, topic: &str) {
    controller
        .start_learning(topic)
        .await
        .expect("start_learning failed");
    let state = controller.start_quiz().await.expect("start_quiz failed");
    let questions = state.quiz.as_ref().map_or(0, |q| q.len());
    for question in 0..questions {
        controller
            .record_answer(question, 0)
            .await
            .expect("record_answer failed");
    }
}

// ============================================================================
// Learning scenarios
// ============================================================================

/// A failing score moves to the result stage and fetches a simplified explanation.
#[tokio::test]
async fn test_failed_quiz_is_retaught() {
    let backend = FakeBackend::start(10, 82).await;
    backend.push_evaluation(55, 1, false);
    let controller = backend.controller();

    controller
        .start_learning("  Machine   Learning ")
        .await
        .expect("start_learning failed");
    let state = controller.start_quiz().await.expect("start_quiz failed");
    let quiz = state.quiz.clone().expect("quiz installed");
    assert_eq!(quiz.len(), 10);
    assert_eq!(quiz.relevance_score, 82);
    assert_eq!(state.answers.len(), 10);
    assert_eq!(state.answers.unanswered_count(), 10);

    for question in 0..10 {
        controller.record_answer(question, 0).await.expect("record");
    }
    let state = controller.submit_quiz().await.expect("submit_quiz failed");

    assert_eq!(state.stage, Stage::Result);
    assert_eq!(state.passed(), Some(false));
    assert_eq!(
        state.simplified_explanation,
        "Machine Learning, explained more simply."
    );
    assert!(!state.is_busy());
    assert!(state.error.is_none());

    assert_eq!(
        backend.paths(),
        vec!["/explain", "/generate-quiz", "/evaluate", "/reteach"]
    );

    let body = backend.last_body("/evaluate").expect("evaluate body");
    assert_eq!(body["topic"], "Machine Learning");
    assert_eq!(body["answers"], json!([0, 0, 0, 0, 0, 0, 0, 0, 0, 0]));
    assert_eq!(
        body["correct_answers"],
        json!([0, 1, 2, 3, 0, 1, 2, 3, 0, 1])
    );
}

/// A passing score needs no reteach.
#[tokio::test]
async fn test_passed_quiz_skips_reteach() {
    let backend = FakeBackend::start(10, 82).await;
    backend.push_evaluation(85, 1, false);
    let controller = backend.controller();

    answer_quiz(&controller, "Machine Learning").await;
    let state = controller.submit_quiz().await.expect("submit_quiz failed");

    assert_eq!(state.stage, Stage::Result);
    assert_eq!(state.passed(), Some(true));
    assert!(state.simplified_explanation.is_empty());
    assert!(!backend.paths().contains(&"/reteach".to_string()));
}

/// Once the backend reports the last attempt, retrying is refused locally.
#[tokio::test]
async fn test_retry_refused_after_last_attempt() {
    let backend = FakeBackend::start(4, 70).await;
    backend.push_evaluation(40, 3, true);
    let controller = backend.controller();

    answer_quiz(&controller, "Transformers").await;
    let state = controller.submit_quiz().await.expect("submit_quiz failed");
    assert!(state.is_exhausted());
    assert!(!state.can_retry());

    let err = controller.retry_quiz().await.unwrap_err();
    assert!(matches!(err, SessionError::AttemptsExhausted { .. }));

    let quiz_requests = backend
        .paths()
        .iter()
        .filter(|p| *p == "/generate-quiz")
        .count();
    assert_eq!(quiz_requests, 1);

    // A different topic is unaffected.
    let state = controller.advance_topic().await.expect("advance_topic failed");
    assert_eq!(state.stage, Stage::Explanation);
    assert_eq!(state.topic.as_deref(), Some("Diffusion Models"));
    assert!(!state.is_exhausted());
}

/// The backend's own error message reaches the learner and the quiz is kept.
#[tokio::test]
async fn test_backend_detail_is_surfaced() {
    let backend = FakeBackend::start(3, 90).await;
    backend.push_evaluation_error(
        StatusCode::BAD_REQUEST,
        "Maximum 3 attempts reached for this topic",
    );
    let controller = backend.controller();

    answer_quiz(&controller, "Generative AI").await;
    let err = controller.submit_quiz().await.unwrap_err();
    assert_eq!(err.to_string(), "Maximum 3 attempts reached for this topic");

    let state = controller.snapshot().await;
    assert_eq!(state.stage, Stage::Quiz);
    assert!(state.answers.is_complete());
    assert!(!state.is_busy());
    assert_eq!(
        state.error.as_deref(),
        Some("Maximum 3 attempts reached for this topic")
    );
}

/// A backend that is down fails the operation without leaving the session busy.
#[tokio::test]
async fn test_unreachable_backend_keeps_stage() {
    let backend = FakeBackend::start(3, 90).await;
    let mut config = backend.config();
    config.backend_url = "http://127.0.0.1:9".to_string();
    let gateway = mastery_gateway::HttpGateway::new(
        mastery_gateway::GatewayOptions::from_config(&config, None),
    )
    .expect("gateway");
    let controller = SessionController::new(Arc::new(gateway), &config);

    let err = controller.start_learning("Transformers").await.unwrap_err();
    assert!(err.to_string().starts_with("Failed to load explanation"));

    let state = controller.snapshot().await;
    assert_eq!(state.stage, Stage::TopicSelection);
    assert!(!state.is_busy());
}

/// Graded attempts come back from the progress endpoint and feed the report.
#[tokio::test]
async fn test_progress_feeds_report() {
    let backend = FakeBackend::start(4, 75).await;
    backend.push_evaluation(50, 1, false);
    backend.push_evaluation(90, 2, false);
    let controller = backend.controller();

    answer_quiz(&controller, "Neural Networks").await;
    controller.submit_quiz().await.expect("first submit");
    let state = controller.retry_quiz().await.expect("retry_quiz failed");
    assert_eq!(state.stage, Stage::Quiz);
    for question in 0..4 {
        controller.record_answer(question, 1).await.expect("record");
    }
    controller.submit_quiz().await.expect("second submit");

    let records = controller.list_progress().await.expect("list_progress");
    assert_eq!(records.len(), 2);

    let attempts = records
        .into_iter()
        .map(|r| AttemptInput {
            topic: r.topic,
            attempt_number: r.attempt_number,
            score: r.score,
            date: r.date,
        })
        .collect();
    let report = ProgressReport::from_attempts(attempts, 0).expect("report");

    assert_eq!(report.stats.total_attempts, 2);
    assert_eq!(report.stats.passed, 1);
    assert_eq!(report.stats.average_score, 70);
    assert_eq!(report.topics.len(), 1);
    assert_eq!(report.topics[0].best_score, 90);
}

// ============================================================================
// Local HTTP API
// ============================================================================

/// The local API drives the same controller over real HTTP.
#[tokio::test]
async fn test_local_api_round_trip() {
    let backend = FakeBackend::start(2, 88).await;
    backend.push_evaluation(100, 1, false);
    let controller = backend.controller();

    let router = create_router(AppState::new(backend.config(), controller));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });
    let api = format!("http://{addr}/api");
    let client = reqwest::Client::new();

    // Submitting before a quiz exists is a conflict.
    let response = client
        .post(format!("{api}/session/submit"))
        .send()
        .await
        .expect("submit request");
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);
    let body: Value = response.json().await.expect("error body");
    assert!(body["error"].as_str().is_some_and(|e| e.contains("topic selection")));

    let response = client
        .post(format!("{api}/session/learn"))
        .json(&json!({ "catalogTopic": "computer vision" }))
        .send()
        .await
        .expect("learn request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let state: Value = response.json().await.expect("state body");
    assert_eq!(state["stage"], "explanation");
    assert_eq!(state["topic"], "Computer Vision");

    client
        .post(format!("{api}/session/quiz"))
        .send()
        .await
        .expect("quiz request");
    for question in 0..2 {
        let response = client
            .post(format!("{api}/session/answer"))
            .json(&json!({ "question": question, "option": question }))
            .send()
            .await
            .expect("answer request");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }

    let response = client
        .post(format!("{api}/session/answer"))
        .json(&json!({ "question": 5, "option": 0 }))
        .send()
        .await
        .expect("answer request");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{api}/session/submit"))
        .send()
        .await
        .expect("submit request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let state: Value = response.json().await.expect("state body");
    assert_eq!(state["stage"], "result");
    assert_eq!(state["evaluation"]["score"], 100);

    let progress: Value = client
        .get(format!("{api}/progress"))
        .send()
        .await
        .expect("progress request")
        .json()
        .await
        .expect("progress body");
    assert_eq!(progress["progress"][0]["topic"], "Computer Vision");
}
