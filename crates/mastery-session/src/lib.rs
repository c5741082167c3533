//! Mastery Loop session controller
//!
//! Sequences a learner through explanation, quiz, grading and reteach
//! against a remote tutoring service, and exposes the session over HTTP
//! and WebSocket.

pub mod api;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod session;
pub mod websocket;

#[cfg(test)]
mod testing;

pub use api::{
    create_router, AnswerRequest, AppState, ErrorResponse, LearnRequest, TopicsResponse,
};
pub use catalog::{normalize_topic, TopicCatalog, CANONICAL_TOPICS};
pub use config::{Config, CONFIG_FILE_NAME};
pub use controller::SessionController;
pub use error::{Result, SessionError};
pub use gateway::{
    EvaluateRequest, ExplainResponse, GatewayError, ProgressResponse, ReteachResponse,
    TopicRequest, TutoringGateway,
};
pub use session::{
    AnswerSet, EvaluationResult, Operation, PendingOperation, ProgressRecord, QuizQuestion,
    QuizSet, SessionState, Stage, MASTERY_THRESHOLD, MAX_ATTEMPTS,
};
pub use websocket::{EventBroadcaster, SessionEvent};
