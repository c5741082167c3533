//! Error types for the learning session controller.
//!
//! Errors fall into three groups: configuration problems, local rejections
//! of a learner action (validation, wrong stage, busy), and failures of the
//! remote tutoring service. Every session error is recoverable; the learner
//! can always retry the same or a different action.

use std::path::PathBuf;

use crate::gateway::GatewayError;
use crate::session::{Operation, Stage};

/// A specialized `Result` type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that can occur while driving a learning session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your mastery.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Input Validation Errors
    // ========================================================================
    /// The topic was empty after trimming.
    #[error("Please select or enter a topic")]
    EmptyTopic,

    /// Submission attempted with unanswered questions.
    #[error("Please answer all questions before submitting ({unanswered} unanswered)")]
    IncompleteAnswers {
        /// Number of questions still unanswered.
        unanswered: usize,
    },

    /// Question index outside the installed quiz.
    #[error("Question {question} does not exist (quiz has {total} questions)")]
    QuestionOutOfRange {
        /// The rejected question index.
        question: usize,
        /// Number of questions in the quiz.
        total: usize,
    },

    /// Option index outside the question's options.
    #[error("Option {option} does not exist for question {question} ({total} options)")]
    OptionOutOfRange {
        /// The question being answered.
        question: usize,
        /// The rejected option index.
        option: usize,
        /// Number of options for that question.
        total: usize,
    },

    // ========================================================================
    // Workflow Errors
    // ========================================================================
    /// Operation not valid in the current stage.
    #[error("Cannot {operation} while in the {stage} stage")]
    InvalidStage {
        /// The attempted operation.
        operation: Operation,
        /// The stage the session was in.
        stage: Stage,
    },

    /// Another operation is still waiting on the tutoring service.
    #[error("Another request is still running ({pending}); please wait for it to finish")]
    Busy {
        /// The operation currently in flight.
        pending: Operation,
    },

    /// The backend has reported that no attempts remain for this topic.
    #[error("Maximum attempts reached for '{topic}'. Please review the material or choose a different topic")]
    AttemptsExhausted {
        /// The exhausted topic.
        topic: String,
    },

    /// The catalog has no topics to advance to.
    #[error("The topic catalog is empty")]
    EmptyCatalog,

    /// A response arrived after the session was reset or moved on.
    #[error("Discarded the result of '{operation}' because the session changed while it was running")]
    Superseded {
        /// The operation whose result was discarded.
        operation: Operation,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// The tutoring service failed a primary operation.
    #[error("{message}")]
    Remote {
        /// The operation that failed.
        operation: Operation,
        /// Human-readable message shown to the learner.
        message: String,
        /// The underlying gateway error.
        #[source]
        source: GatewayError,
    },
}

impl SessionError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `InvalidStage` error.
    #[must_use]
    pub const fn invalid_stage(operation: Operation, stage: Stage) -> Self {
        Self::InvalidStage { operation, stage }
    }

    /// Creates a new `AttemptsExhausted` error.
    #[must_use]
    pub fn attempts_exhausted(topic: impl Into<String>) -> Self {
        Self::AttemptsExhausted {
            topic: topic.into(),
        }
    }

    /// Wraps a gateway failure, preferring the backend's own detail message
    /// and falling back to the operation's generic failure text.
    #[must_use]
    pub fn remote(operation: Operation, source: GatewayError) -> Self {
        let message = source.detail().map_or_else(
            || format!("{} ({source})", operation.failure_message()),
            ToString::to_string,
        );
        Self::Remote {
            operation,
            message,
            source,
        }
    }

    /// Returns `true` if the error is a local input validation failure.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyTopic
                | Self::IncompleteAnswers { .. }
                | Self::QuestionOutOfRange { .. }
                | Self::OptionOutOfRange { .. }
        )
    }

    /// Returns `true` if the error leaves the session untouched because
    /// another operation owns it (busy or superseded).
    #[must_use]
    pub const fn is_contention(&self) -> bool {
        matches!(self, Self::Busy { .. } | Self::Superseded { .. })
    }

    /// Returns `true` if retrying the same action later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Remote { source, .. } => source.is_transient(),
            Self::Busy { .. } | Self::Superseded { .. } => true,
            _ => false,
        }
    }
}
