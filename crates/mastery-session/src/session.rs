//! Session state types for the learning workflow.
//!
//! This module defines the state machine that sequences a learner through
//! topic selection, explanation, quiz and result. [`SessionState`] only holds
//! data and enforces transition rules; the remote calls live in
//! [`crate::controller::SessionController`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SessionError};
use crate::gateway::GatewayError;

/// Minimum score (inclusive) that counts as mastery.
pub const MASTERY_THRESHOLD: u8 = 70;

/// Maximum number of graded attempts the backend allows per topic.
pub const MAX_ATTEMPTS: u32 = 3;

// ============================================================================
// Stage
// ============================================================================

/// Current stage of the learning session.
///
/// The stage transitions through:
/// - `TopicSelection` -> `Explanation` (start learning)
/// - `Explanation` -> `Quiz` (start quiz)
/// - `Quiz` -> `Result` (submit quiz)
/// - From `Result`:
///   - `Quiz` (retry, same topic)
///   - `Explanation` (advance to the next topic)
///   - `TopicSelection` (reset)
///
/// There is no terminal stage; sessions loop across topics indefinitely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Learner is choosing a topic.
    #[default]
    TopicSelection,
    /// Explanation for the active topic is displayed.
    Explanation,
    /// Quiz is installed and being answered.
    Quiz,
    /// Quiz has been graded.
    Result,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TopicSelection => write!(f, "topic selection"),
            Self::Explanation => write!(f, "explanation"),
            Self::Quiz => write!(f, "quiz"),
            Self::Result => write!(f, "result"),
        }
    }
}

// ============================================================================
// Operation
// ============================================================================

/// Learner-triggered operations on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Fetch an explanation for a topic.
    StartLearning,
    /// Generate a quiz for the active topic.
    StartQuiz,
    /// Record an answer locally.
    RecordAnswer,
    /// Grade the answered quiz.
    SubmitQuiz,
    /// Generate a fresh quiz for the same topic.
    RetryQuiz,
    /// Move to the next catalog topic.
    AdvanceTopic,
    /// Read the learner's attempt history.
    LoadProgress,
}

impl Operation {
    /// Generic failure text used when the backend gives no detail.
    #[must_use]
    pub const fn failure_message(&self) -> &'static str {
        match self {
            Self::StartLearning | Self::AdvanceTopic => "Failed to load explanation",
            Self::StartQuiz | Self::RetryQuiz => "Failed to generate quiz",
            Self::SubmitQuiz => "Failed to submit quiz",
            Self::RecordAnswer => "Failed to record answer",
            Self::LoadProgress => "Failed to fetch progress",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartLearning => write!(f, "start learning"),
            Self::StartQuiz => write!(f, "start the quiz"),
            Self::RecordAnswer => write!(f, "record an answer"),
            Self::SubmitQuiz => write!(f, "submit the quiz"),
            Self::RetryQuiz => write!(f, "retry the quiz"),
            Self::AdvanceTopic => write!(f, "advance to the next topic"),
            Self::LoadProgress => write!(f, "load progress"),
        }
    }
}

// ============================================================================
// Quiz
// ============================================================================

/// A single multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    /// The question prompt.
    pub question: String,

    /// Answer options in display order.
    pub options: Vec<String>,

    /// Index of the correct option, as supplied by the backend.
    pub answer_index: usize,
}

/// A generated quiz with its advisory relevance score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSet {
    /// Questions in display order.
    pub questions: Vec<QuizQuestion>,

    /// How well the quiz matches its source explanation (0-100). Advisory only.
    pub relevance_score: u8,
}

impl QuizSet {
    /// Checks the structural invariants of a quiz received from the backend.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidResponse` if the quiz is empty, a question
    /// has fewer than two options, an answer index is out of range, or the
    /// relevance score exceeds 100.
    pub fn validate(&self) -> std::result::Result<(), GatewayError> {
        if self.questions.is_empty() {
            return Err(GatewayError::invalid_response("quiz contains no questions"));
        }
        if self.relevance_score > 100 {
            return Err(GatewayError::invalid_response(format!(
                "relevance score {} is outside 0-100",
                self.relevance_score
            )));
        }
        for (index, question) in self.questions.iter().enumerate() {
            if question.options.len() < 2 {
                return Err(GatewayError::invalid_response(format!(
                    "question {} has {} options, expected at least 2",
                    index + 1,
                    question.options.len()
                )));
            }
            if question.answer_index >= question.options.len() {
                return Err(GatewayError::invalid_response(format!(
                    "question {} marks option {} correct but only has {} options",
                    index + 1,
                    question.answer_index,
                    question.options.len()
                )));
            }
        }
        Ok(())
    }

    /// Returns the number of questions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Returns `true` if the quiz has no questions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Returns the correct option index for every question, in order.
    #[must_use]
    pub fn correct_answers(&self) -> Vec<usize> {
        self.questions.iter().map(|q| q.answer_index).collect()
    }
}

// ============================================================================
// AnswerSet
// ============================================================================

/// The learner's answers, one slot per question.
///
/// Serialized as an array of integers where `-1` marks an unanswered question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerSet {
    slots: Vec<Option<usize>>,
}

impl AnswerSet {
    /// Wire value for an unanswered question.
    pub const UNANSWERED: i64 = -1;

    /// Creates an answer set with `len` unanswered slots.
    #[must_use]
    pub fn unanswered(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    /// Builds an answer set from wire values; any negative value is unanswered.
    #[must_use]
    pub fn from_wire(values: &[i64]) -> Self {
        Self {
            slots: values
                .iter()
                .map(|&v| usize::try_from(v).ok())
                .collect(),
        }
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the selected option for a question, if answered.
    #[must_use]
    pub fn get(&self, question: usize) -> Option<usize> {
        self.slots.get(question).copied().flatten()
    }

    /// Number of unanswered questions.
    #[must_use]
    pub fn unanswered_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_none()).count()
    }

    /// Returns `true` if there is at least one slot and every slot is answered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.slots.is_empty() && self.unanswered_count() == 0
    }

    /// Returns the answers as plain indices if every question is answered.
    #[must_use]
    pub fn complete(&self) -> Option<Vec<usize>> {
        if self.slots.is_empty() {
            return None;
        }
        self.slots.iter().copied().collect()
    }

    /// Returns the wire representation (`-1` for unanswered).
    #[must_use]
    pub fn to_wire(&self) -> Vec<i64> {
        self.slots
            .iter()
            .map(|slot| {
                slot.and_then(|v| i64::try_from(v).ok())
                    .unwrap_or(Self::UNANSWERED)
            })
            .collect()
    }

    fn set(&mut self, question: usize, option: usize) {
        if let Some(slot) = self.slots.get_mut(question) {
            *slot = Some(option);
        }
    }
}

impl Serialize for AnswerSet {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.to_wire())
    }
}

impl<'de> Deserialize<'de> for AnswerSet {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Vec::<i64>::deserialize(deserializer)?;
        Ok(Self::from_wire(&values))
    }
}

// ============================================================================
// EvaluationResult
// ============================================================================

/// Grading result returned by the backend. Attempt accounting is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Percentage score (0-100).
    pub score: u8,

    /// Which attempt at this topic was graded (1-based).
    pub attempt_number: u32,

    /// Whether the learner has used up every attempt for this topic.
    pub max_attempts_reached: bool,
}

impl EvaluationResult {
    /// Returns `true` if the score meets the mastery threshold.
    ///
    /// # Examples
    ///
    /// ```
    /// use mastery_session::EvaluationResult;
    ///
    /// let result = EvaluationResult { score: 70, attempt_number: 1, max_attempts_reached: false };
    /// assert!(result.passed());
    ///
    /// let result = EvaluationResult { score: 69, attempt_number: 1, max_attempts_reached: false };
    /// assert!(!result.passed());
    /// ```
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.score >= MASTERY_THRESHOLD
    }

    /// Checks score and attempt ranges.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidResponse` for a score above 100 or an
    /// attempt number outside `1..=MAX_ATTEMPTS`.
    pub fn validate(&self) -> std::result::Result<(), GatewayError> {
        if self.score > 100 {
            return Err(GatewayError::invalid_response(format!(
                "score {} is outside 0-100",
                self.score
            )));
        }
        if !(1..=MAX_ATTEMPTS).contains(&self.attempt_number) {
            return Err(GatewayError::invalid_response(format!(
                "attempt number {} is outside 1-{MAX_ATTEMPTS}",
                self.attempt_number
            )));
        }
        Ok(())
    }
}

// ============================================================================
// ProgressRecord
// ============================================================================

/// One graded attempt from the learner's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Topic of the attempt.
    pub topic: String,

    /// Attempt number for the topic.
    pub attempt_number: u32,

    /// Percentage score.
    pub score: u8,

    /// When the attempt was graded.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub date: DateTime<Utc>,
}

/// Parses an RFC 3339 timestamp, or a naive ISO timestamp interpreted as UTC.
///
/// # Examples
///
/// ```
/// use mastery_session::session::parse_timestamp;
///
/// assert!(parse_timestamp("2026-03-01T10:00:00+05:30").is_some());
/// assert!(parse_timestamp("2026-03-01T04:30:00.123000").is_some());
/// assert!(parse_timestamp("yesterday").is_none());
/// ```
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

// ============================================================================
// PendingOperation
// ============================================================================

/// An operation waiting on the tutoring service.
///
/// Also serves as the ticket that must be presented to apply the result;
/// results for a ticket that is no longer pending are discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Monotonic identifier within the session.
    pub id: u64,

    /// The operation in flight.
    pub operation: Operation,

    /// Topic the operation was issued for.
    pub topic: String,

    /// When the operation started.
    pub started_at: DateTime<Utc>,
}

// ============================================================================
// SessionState
// ============================================================================

/// Complete state of one learner's session.
///
/// Serialized as the body of the local status API and the `connected` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Current stage.
    pub stage: Stage,

    /// Active topic, if one has been explained.
    pub topic: Option<String>,

    /// Explanation for the active topic.
    pub explanation: String,

    /// Installed quiz.
    pub quiz: Option<QuizSet>,

    /// Learner answers for the installed quiz.
    pub answers: AnswerSet,

    /// Grading result for the submitted quiz.
    pub evaluation: Option<EvaluationResult>,

    /// Simplified re-explanation fetched after a failed quiz (empty if none).
    pub simplified_explanation: String,

    /// Highest attempt number the backend has reported for the active topic.
    pub attempts_used: u32,

    /// Topic for which the backend reported that attempts are exhausted.
    pub exhausted_topic: Option<String>,

    /// Message for the most recent failed or rejected action.
    pub error: Option<String>,

    /// Operation currently waiting on the tutoring service.
    pub pending: Option<PendingOperation>,

    #[serde(skip)]
    next_operation_id: u64,
}

impl SessionState {
    /// Creates a new session in the `TopicSelection` stage.
    ///
    /// # Examples
    ///
    /// ```
    /// use mastery_session::{SessionState, Stage};
    ///
    /// let state = SessionState::new();
    /// assert_eq!(state.stage, Stage::TopicSelection);
    /// assert!(state.topic.is_none());
    /// assert!(!state.is_busy());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while an operation is waiting on the tutoring service.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Returns whether the graded quiz passed, if one has been graded.
    #[must_use]
    pub fn passed(&self) -> Option<bool> {
        self.evaluation.as_ref().map(EvaluationResult::passed)
    }

    /// Returns `true` if the backend has exhausted the active topic's attempts.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        match (&self.topic, &self.exhausted_topic) {
            (Some(topic), Some(exhausted)) => topic == exhausted,
            _ => false,
        }
    }

    /// Returns `true` if the quiz can be submitted right now.
    #[must_use]
    pub fn can_submit(&self) -> bool {
        self.stage == Stage::Quiz
            && !self.is_busy()
            && !self.is_exhausted()
            && self.answers.is_complete()
    }

    /// Returns `true` if a retry would be accepted right now.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.stage == Stage::Result && !self.is_busy() && !self.is_exhausted()
    }

    /// Returns `true` if `ticket` is the operation currently in flight.
    #[must_use]
    pub fn is_current(&self, ticket: &PendingOperation) -> bool {
        self.pending.as_ref().is_some_and(|p| p.id == ticket.id)
    }

    /// Fails with `Busy` while another operation is in flight.
    pub fn ensure_idle(&self) -> Result<()> {
        match &self.pending {
            Some(pending) => Err(SessionError::Busy {
                pending: pending.operation,
            }),
            None => Ok(()),
        }
    }

    /// Fails with `InvalidStage` unless the session is in one of `allowed`.
    pub fn ensure_stage(&self, operation: Operation, allowed: &[Stage]) -> Result<()> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(SessionError::invalid_stage(operation, self.stage))
        }
    }

    /// Returns the active topic, failing with `InvalidStage` if there is none.
    pub fn active_topic(&self, operation: Operation) -> Result<String> {
        self.topic
            .clone()
            .ok_or_else(|| SessionError::invalid_stage(operation, self.stage))
    }

    /// Records a rejection as the visible error and hands it back.
    ///
    /// Busy and superseded rejections leave the state untouched.
    pub fn reject(&mut self, error: SessionError) -> SessionError {
        if !error.is_contention() {
            self.error = Some(error.to_string());
        }
        error
    }

    /// Marks `operation` as in flight for `topic` and clears the previous error.
    ///
    /// Callers must check [`Self::ensure_idle`] first.
    pub fn begin(&mut self, operation: Operation, topic: impl Into<String>) -> PendingOperation {
        self.next_operation_id += 1;
        let pending = PendingOperation {
            id: self.next_operation_id,
            operation,
            topic: topic.into(),
            started_at: Utc::now(),
        };
        self.error = None;
        self.pending = Some(pending.clone());
        pending
    }

    fn take_pending(&mut self, ticket: &PendingOperation) -> Result<()> {
        if !self.is_current(ticket) {
            return Err(SessionError::Superseded {
                operation: ticket.operation,
            });
        }
        self.pending = None;
        Ok(())
    }

    /// Applies a fetched explanation and moves to `Explanation`.
    ///
    /// All quiz state is discarded. Moving to a different topic lifts the
    /// exhausted-attempts lock.
    pub fn finish_explanation(
        &mut self,
        ticket: &PendingOperation,
        explanation: String,
    ) -> Result<()> {
        self.take_pending(ticket)?;

        if self.topic.as_deref() != Some(ticket.topic.as_str()) {
            self.attempts_used = 0;
        }
        if self.exhausted_topic.as_deref() != Some(ticket.topic.as_str()) {
            self.exhausted_topic = None;
        }

        self.topic = Some(ticket.topic.clone());
        self.explanation = explanation;
        self.clear_quiz();
        self.stage = Stage::Explanation;
        Ok(())
    }

    /// Installs a generated quiz and moves to `Quiz`.
    ///
    /// The answer set is re-initialized to all unanswered.
    pub fn finish_quiz(&mut self, ticket: &PendingOperation, quiz: QuizSet) -> Result<()> {
        self.take_pending(ticket)?;

        self.answers = AnswerSet::unanswered(quiz.len());
        self.quiz = Some(quiz);
        self.evaluation = None;
        self.simplified_explanation.clear();
        self.stage = Stage::Quiz;
        Ok(())
    }

    /// Stores a grading result (and reteach text) and moves to `Result`.
    pub fn finish_evaluation(
        &mut self,
        ticket: &PendingOperation,
        evaluation: EvaluationResult,
        simplified_explanation: String,
    ) -> Result<()> {
        self.take_pending(ticket)?;

        if evaluation.attempt_number < self.attempts_used {
            tracing::warn!(
                topic = %ticket.topic,
                previous = self.attempts_used,
                reported = evaluation.attempt_number,
                "Backend reported a lower attempt number than before"
            );
        }
        self.attempts_used = self.attempts_used.max(evaluation.attempt_number);
        if evaluation.max_attempts_reached {
            self.exhausted_topic = Some(ticket.topic.clone());
        }

        self.evaluation = Some(evaluation);
        self.simplified_explanation = simplified_explanation;
        self.stage = Stage::Result;
        Ok(())
    }

    /// Ends `ticket` with an error message, keeping the pre-call stage.
    pub fn fail(&mut self, ticket: &PendingOperation, message: impl Into<String>) -> Result<()> {
        self.take_pending(ticket)?;
        self.error = Some(message.into());
        Ok(())
    }

    /// Records the learner's choice for one question.
    pub fn record_answer(&mut self, question: usize, option: usize) -> Result<()> {
        self.ensure_idle()?;
        self.ensure_stage(Operation::RecordAnswer, &[Stage::Quiz])?;

        let Some(quiz) = &self.quiz else {
            return Err(SessionError::invalid_stage(
                Operation::RecordAnswer,
                self.stage,
            ));
        };
        let Some(entry) = quiz.questions.get(question) else {
            return Err(SessionError::QuestionOutOfRange {
                question,
                total: quiz.len(),
            });
        };
        if option >= entry.options.len() {
            return Err(SessionError::OptionOutOfRange {
                question,
                option,
                total: entry.options.len(),
            });
        }

        self.answers.set(question, option);
        self.error = None;
        Ok(())
    }

    /// Clears everything and returns to `TopicSelection`.
    ///
    /// Any in-flight operation is abandoned; its result will be discarded.
    ///
    /// # Examples
    ///
    /// ```
    /// use mastery_session::{SessionState, Stage};
    ///
    /// let mut state = SessionState::new();
    /// state.topic = Some("Transformers".to_string());
    /// state.stage = Stage::Explanation;
    ///
    /// state.reset();
    /// let once = state.clone();
    /// state.reset();
    ///
    /// assert_eq!(state, once);
    /// assert_eq!(state.stage, Stage::TopicSelection);
    /// ```
    pub fn reset(&mut self) {
        *self = Self {
            next_operation_id: self.next_operation_id,
            ..Self::default()
        };
    }

    fn clear_quiz(&mut self) {
        self.quiz = None;
        self.answers = AnswerSet::default();
        self.evaluation = None;
        self.simplified_explanation.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
