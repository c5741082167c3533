//! Contract with the remote tutoring service.
//!
//! The controller only talks to the backend through [`TutoringGateway`], so
//! the HTTP client and test doubles are interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::session::{EvaluationResult, ProgressRecord, QuizSet};

/// Errors reported by a gateway implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The request never produced a response (connection refused, DNS, TLS).
    #[error("could not reach the tutoring service: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The request exceeded the configured timeout.
    #[error("request to the tutoring service timed out")]
    Timeout,

    /// The backend answered with a non-success status.
    #[error("tutoring service returned HTTP {status}{}", detail_suffix(.detail))]
    Status {
        /// HTTP status code.
        status: u16,
        /// The backend's `detail` message, if it sent one.
        detail: Option<String>,
    },

    /// The response body was missing fields or broke a data invariant.
    #[error("tutoring service sent an invalid response: {message}")]
    InvalidResponse {
        /// What was wrong with the response.
        message: String,
    },
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

impl GatewayError {
    /// Creates a new `Transport` error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a new `Status` error.
    #[must_use]
    pub const fn status(status: u16, detail: Option<String>) -> Self {
        Self::Status { status, detail }
    }

    /// Creates a new `InvalidResponse` error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Returns the backend's own failure message, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Status {
                detail: Some(detail),
                ..
            } => Some(detail),
            _ => None,
        }
    }

    /// Returns `true` for transport failures, timeouts and 5xx responses.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout => true,
            Self::Status { status, .. } => *status >= 500,
            Self::InvalidResponse { .. } => false,
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// Body for the topic-only endpoints (`explain`, `generate-quiz`, `reteach`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRequest {
    /// The topic to operate on.
    pub topic: String,
}

/// Response of `explain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainResponse {
    /// Explanation text.
    pub explanation: String,
}

/// Response of `reteach`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReteachResponse {
    /// Simplified explanation text.
    pub simplified_explanation: String,
}

/// Response of `progress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressResponse {
    /// Every graded attempt the backend knows about.
    pub progress: Vec<ProgressRecord>,
}

/// Body of `evaluate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateRequest {
    /// Topic being graded.
    pub topic: String,

    /// Selected option per question.
    pub answers: Vec<usize>,

    /// Correct option per question, when the client forwards them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answers: Option<Vec<usize>>,
}

/// Remote tutoring operations.
///
/// Implementations are expected to validate responses against the data
/// invariants (see [`QuizSet::validate`] and [`EvaluationResult::validate`])
/// or leave that to the controller, which checks them again.
#[async_trait]
pub trait TutoringGateway: Send + Sync {
    /// Fetches an explanation for `topic`.
    async fn explain(&self, topic: &str) -> Result<String, GatewayError>;

    /// Generates a quiz for `topic`.
    async fn generate_quiz(&self, topic: &str) -> Result<QuizSet, GatewayError>;

    /// Grades a completed answer set.
    async fn evaluate(&self, request: &EvaluateRequest) -> Result<EvaluationResult, GatewayError>;

    /// Fetches a simplified explanation for `topic`.
    async fn reteach(&self, topic: &str) -> Result<String, GatewayError>;

    /// Lists the learner's graded attempts.
    async fn list_progress(&self) -> Result<Vec<ProgressRecord>, GatewayError>;
}
