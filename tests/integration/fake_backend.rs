//! In-process stand-in for the tutoring service.
//!
//! Serves the same JSON endpoints on an ephemeral port, replays scripted
//! grading results and records every request it receives.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mastery_gateway::{GatewayOptions, HttpGateway};
use mastery_session::{Config, SessionController};
use serde_json::{json, Value};

enum Reply {
    Graded(Value),
    Error(StatusCode, Value),
}

struct BackendState {
    questions: usize,
    relevance_score: u8,
    evaluations: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<(String, Value)>>,
    progress: Mutex<Vec<Value>>,
}

impl BackendState {
    fn record(&self, path: &str, body: Value) {
        self.requests
            .lock()
            .expect("requests lock")
            .push((path.to_string(), body));
    }
}

/// Handle to a running fake backend.
pub struct FakeBackend {
    pub base_url: String,
    state: Arc<BackendState>,
}

impl FakeBackend {
    /// Starts a backend whose quizzes have `questions` four-option questions.
    pub async fn start(questions: usize, relevance_score: u8) -> Self {
        let state = Arc::new(BackendState {
            questions,
            relevance_score,
            evaluations: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            progress: Mutex::new(Vec::new()),
        });

        let router = Router::new()
            .route("/", get(|| async { Json(json!({"status": "ok"})) }))
            .route("/explain", post(explain))
            .route("/generate-quiz", post(generate_quiz))
            .route("/evaluate", post(evaluate))
            .route("/reteach", post(reteach))
            .route("/progress", get(progress))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server failed");
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    /// Queues a successful grading result.
    pub fn push_evaluation(&self, score: u8, attempt_number: u32, max_attempts_reached: bool) {
        self.state
            .evaluations
            .lock()
            .expect("evaluations lock")
            .push_back(Reply::Graded(json!({
                "score": score,
                "attempt_number": attempt_number,
                "max_attempts_reached": max_attempts_reached,
            })));
    }

    /// Queues an error response with a `detail` message.
    pub fn push_evaluation_error(&self, status: StatusCode, detail: &str) {
        self.state
            .evaluations
            .lock()
            .expect("evaluations lock")
            .push_back(Reply::Error(status, json!({ "detail": detail })));
    }

    /// Paths of every request received, in order.
    pub fn paths(&self) -> Vec<String> {
        self.state
            .requests
            .lock()
            .expect("requests lock")
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Body of the most recent request to `path`.
    pub fn last_body(&self, path: &str) -> Option<Value> {
        self.state
            .requests
            .lock()
            .expect("requests lock")
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, body)| body.clone())
    }

    /// Configuration pointing at this backend.
    pub fn config(&self) -> Config {
        Config {
            backend_url: self.base_url.clone(),
            request_timeout_secs: 5,
            ..Config::default()
        }
    }

    /// A controller wired to this backend through the HTTP gateway.
    pub fn controller(&self) -> SessionController {
        let config = self.config();
        let gateway = HttpGateway::new(GatewayOptions::from_config(&config, None))
            .expect("Failed to build gateway");
        SessionController::new(Arc::new(gateway), &config)
    }
}

fn topic_of(body: &Value) -> String {
    body["topic"].as_str().unwrap_or_default().to_string()
}

async fn explain(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Json<Value> {
    let topic = topic_of(&body);
    state.record("/explain", body);
    Json(json!({ "explanation": format!("{topic} is a fascinating subject.") }))
}

async fn generate_quiz(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let topic = topic_of(&body);
    state.record("/generate-quiz", body);

    let questions: Vec<Value> = (0..state.questions)
        .map(|i| {
            json!({
                "question": format!("{topic} question {}?", i + 1),
                "options": ["A", "B", "C", "D"],
                "answer_index": i % 4,
            })
        })
        .collect();
    Json(json!({ "questions": questions, "relevance_score": state.relevance_score }))
}

async fn evaluate(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    let topic = topic_of(&body);
    state.record("/evaluate", body);

    let reply = state
        .evaluations
        .lock()
        .expect("evaluations lock")
        .pop_front();
    match reply {
        Some(Reply::Graded(result)) => {
            state.progress.lock().expect("progress lock").push(json!({
                "topic": topic,
                "attempt_number": result["attempt_number"],
                "score": result["score"],
                "date": chrono::Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            }));
            Json(result).into_response()
        }
        Some(Reply::Error(status, body)) => (status, Json(body)).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": "no grading result scripted" })),
        )
            .into_response(),
    }
}

async fn reteach(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Json<Value> {
    let topic = topic_of(&body);
    state.record("/reteach", body);
    Json(json!({ "simplified_explanation": format!("{topic}, explained more simply.") }))
}

async fn progress(State(state): State<Arc<BackendState>>) -> Json<Value> {
    state.record("/progress", Value::Null);
    let progress = state.progress.lock().expect("progress lock").clone();
    Json(json!({ "progress": progress }))
}
