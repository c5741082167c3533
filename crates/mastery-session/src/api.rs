//! Local HTTP API exposing one learning session to a browser UI.
//!
//! # Endpoints
//!
//! - `GET /api/session` - Current session state
//! - `GET /api/topics` - Topic catalog
//! - `POST /api/session/learn` - Start learning a topic
//! - `POST /api/session/quiz` - Generate a quiz
//! - `POST /api/session/answer` - Record an answer
//! - `POST /api/session/submit` - Submit the quiz
//! - `POST /api/session/retry` - Retry with a fresh quiz
//! - `POST /api/session/advance` - Advance to the next topic
//! - `POST /api/session/reset` - Reset the session
//! - `GET /api/progress` - Attempt history
//! - `GET /ws` - Session event stream
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mastery_session::{create_router, AppState, Config, SessionController, TutoringGateway};
//!
//! # async fn example(gateway: Arc<dyn TutoringGateway>) {
//! let config = Config::default();
//! let controller = SessionController::new(gateway, &config);
//! let router = create_router(AppState::new(config, controller));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::controller::SessionController;
use crate::error::SessionError;
use crate::gateway::ProgressResponse;
use crate::session::SessionState;
use crate::websocket::ws_handler;
use crate::Config;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `POST /api/session/learn`.
///
/// Free text wins over the catalog choice while it is non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnRequest {
    /// Topic typed by the learner.
    #[serde(default)]
    pub topic: Option<String>,
    /// Topic picked from the catalog.
    #[serde(default)]
    pub catalog_topic: Option<String>,
}

/// Request body for `POST /api/session/answer`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnswerRequest {
    /// Question index.
    pub question: usize,
    /// Selected option index.
    pub option: usize,
}

/// Response body for `GET /api/topics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsResponse {
    /// Catalog topics in advance order.
    pub topics: Vec<String>,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Config,
    /// The session served by this process.
    pub controller: SessionController,
}

impl AppState {
    /// Creates a new `AppState`.
    #[must_use]
    pub const fn new(config: Config, controller: SessionController) -> Self {
        Self { config, controller }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        Self(error)
    }
}

/// Maps a session error onto an HTTP status.
fn status_for(error: &SessionError) -> StatusCode {
    match error {
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        SessionError::InvalidStage { .. }
        | SessionError::Busy { .. }
        | SessionError::Superseded { .. }
        | SessionError::AttemptsExhausted { .. }
        | SessionError::EmptyCatalog => StatusCode::CONFLICT,
        SessionError::Remote { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints and the WebSocket route.
///
/// Requests are traced and CORS is fully permissive so a development UI on
/// another port can call the API.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/session", get(handle_session))
        .route("/session/learn", post(handle_learn))
        .route("/session/quiz", post(handle_quiz))
        .route("/session/answer", post(handle_answer))
        .route("/session/submit", post(handle_submit))
        .route("/session/retry", post(handle_retry))
        .route("/session/advance", post(handle_advance))
        .route("/session/reset", post(handle_reset))
        .route("/topics", get(handle_topics))
        .route("/progress", get(handle_progress));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_session(State(state): State<Arc<AppState>>) -> Json<SessionState> {
    Json(state.controller.snapshot().await)
}

async fn handle_topics(State(state): State<Arc<AppState>>) -> Json<TopicsResponse> {
    Json(TopicsResponse {
        topics: state.controller.catalog().topics().to_vec(),
    })
}

/// Handler for `POST /api/session/learn`.
async fn handle_learn(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LearnRequest>,
) -> ApiResult<SessionState> {
    let topic = state
        .controller
        .catalog()
        .resolve(request.topic.as_deref(), request.catalog_topic.as_deref())
        .unwrap_or_default();
    info!(topic = %topic, "Learn request received");
    Ok(Json(state.controller.start_learning(&topic).await?))
}

async fn handle_quiz(State(state): State<Arc<AppState>>) -> ApiResult<SessionState> {
    Ok(Json(state.controller.start_quiz().await?))
}

async fn handle_answer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<SessionState> {
    Ok(Json(
        state
            .controller
            .record_answer(request.question, request.option)
            .await?,
    ))
}

async fn handle_submit(State(state): State<Arc<AppState>>) -> ApiResult<SessionState> {
    Ok(Json(state.controller.submit_quiz().await?))
}

async fn handle_retry(State(state): State<Arc<AppState>>) -> ApiResult<SessionState> {
    Ok(Json(state.controller.retry_quiz().await?))
}

async fn handle_advance(State(state): State<Arc<AppState>>) -> ApiResult<SessionState> {
    Ok(Json(state.controller.advance_topic().await?))
}

async fn handle_reset(State(state): State<Arc<AppState>>) -> Json<SessionState> {
    Json(state.controller.reset().await)
}

/// Handler for `GET /api/progress`. Proxies the backend's history.
async fn handle_progress(State(state): State<Arc<AppState>>) -> ApiResult<ProgressResponse> {
    let progress = state.controller.list_progress().await?;
    Ok(Json(ProgressResponse { progress }))
}

// ============================================================================
// Tests
// ============================================================================
