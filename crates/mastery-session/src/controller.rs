//! Learning session controller.
//!
//! [`SessionController`] owns one [`SessionState`] and drives it through the
//! tutoring service. Each operation checks its preconditions under the state
//! lock, releases the lock for the remote call, then re-acquires it to apply
//! the response. A response whose ticket is no longer pending (because the
//! session was reset in the meantime) is dropped.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::catalog::{normalize_topic, TopicCatalog};
use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::gateway::{EvaluateRequest, GatewayError, TutoringGateway};
use crate::session::{Operation, PendingOperation, ProgressRecord, SessionState, Stage};
use crate::websocket::{EventBroadcaster, SessionEvent};

/// Drives a single learner's session.
///
/// Cloning is cheap; all clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    gateway: Arc<dyn TutoringGateway>,
    catalog: TopicCatalog,
    events: EventBroadcaster,
    send_correct_answers: bool,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("catalog", &self.catalog)
            .field("send_correct_answers", &self.send_correct_answers)
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Creates a controller for a fresh session.
    ///
    /// Takes the catalog, event capacity and `sendCorrectAnswers` flag from
    /// `config`.
    #[must_use]
    pub fn new(gateway: Arc<dyn TutoringGateway>, config: &Config) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            gateway,
            catalog: TopicCatalog::new(&config.topics),
            events: EventBroadcaster::new(config.event_capacity),
            send_correct_answers: config.send_correct_answers,
        }
    }

    /// Returns the topic catalog.
    #[must_use]
    pub const fn catalog(&self) -> &TopicCatalog {
        &self.catalog
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Returns a copy of the current state.
    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Fetches an explanation for `topic` and moves to `Explanation`.
    ///
    /// Allowed from any stage. The topic is trimmed and internal whitespace
    /// collapsed; an empty topic is rejected without a remote call.
    pub async fn start_learning(&self, topic: &str) -> Result<SessionState> {
        let topic = normalize_topic(topic);
        let ticket = {
            let mut state = self.state.lock().await;
            self.precondition(&mut state, Operation::StartLearning, |s| {
                s.ensure_idle()?;
                if topic.is_empty() {
                    return Err(SessionError::EmptyTopic);
                }
                Ok(())
            })?;
            self.begin(&mut state, Operation::StartLearning, &topic)
        };
        self.complete_explanation(ticket).await
    }

    /// Generates a quiz for the active topic and moves to `Quiz`.
    pub async fn start_quiz(&self) -> Result<SessionState> {
        self.request_quiz(Operation::StartQuiz, Stage::Explanation).await
    }

    /// Records the learner's choice for one question. No remote call.
    pub async fn record_answer(&self, question: usize, option: usize) -> Result<SessionState> {
        let mut state = self.state.lock().await;
        if let Err(e) = state.record_answer(question, option) {
            return Err(self.reject(&mut state, Operation::RecordAnswer, e));
        }

        let unanswered = state.answers.unanswered_count();
        debug!(question, option, unanswered, "Answer recorded");
        self.events.send(SessionEvent::answer_recorded(question, option, unanswered));
        Ok(state.clone())
    }

    /// Grades the answered quiz and moves to `Result`.
    ///
    /// A failing score triggers a reteach request; if that fails the result
    /// is still applied with an empty simplified explanation.
    pub async fn submit_quiz(&self) -> Result<SessionState> {
        let (ticket, request) = {
            let mut state = self.state.lock().await;
            let request = self.precondition(&mut state, Operation::SubmitQuiz, |s| {
                s.ensure_idle()?;
                s.ensure_stage(Operation::SubmitQuiz, &[Stage::Quiz])?;
                let topic = s.active_topic(Operation::SubmitQuiz)?;
                if s.is_exhausted() {
                    return Err(SessionError::attempts_exhausted(topic));
                }
                let Some(quiz) = &s.quiz else {
                    return Err(SessionError::invalid_stage(Operation::SubmitQuiz, s.stage));
                };
                let Some(answers) = s.answers.complete() else {
                    return Err(SessionError::IncompleteAnswers {
                        unanswered: s.answers.unanswered_count(),
                    });
                };
                Ok(EvaluateRequest {
                    topic,
                    answers,
                    correct_answers: self.send_correct_answers.then(|| quiz.correct_answers()),
                })
            })?;
            let ticket = self.begin(&mut state, Operation::SubmitQuiz, &request.topic);
            (ticket, request)
        };

        let outcome = self
            .gateway
            .evaluate(&request)
            .await
            .and_then(|evaluation| evaluation.validate().map(|()| evaluation));

        let evaluation = match outcome {
            Ok(evaluation) => evaluation,
            Err(source) => {
                let mut state = self.state.lock().await;
                self.discard_if_stale(&state, &ticket)?;
                return self.fail(&mut state, &ticket, source);
            }
        };

        let simplified = if evaluation.passed() {
            String::new()
        } else {
            self.fetch_reteach(&ticket).await
        };

        let mut state = self.state.lock().await;
        self.discard_if_stale(&state, &ticket)?;
        let from = state.stage;
        state.finish_evaluation(&ticket, evaluation, simplified)?;

        let retaught = !state.simplified_explanation.is_empty();
        info!(
            topic = %ticket.topic,
            score = evaluation.score,
            attempt = evaluation.attempt_number,
            passed = evaluation.passed(),
            max_attempts_reached = evaluation.max_attempts_reached,
            retaught,
            "Quiz evaluated"
        );
        self.events
            .send(SessionEvent::evaluated(&ticket.topic, evaluation, retaught));
        self.stage_changed(from, &state);
        Ok(state.clone())
    }

    /// Generates a fresh quiz for the same topic.
    ///
    /// Refused once the backend has reported that the topic's attempts are
    /// exhausted.
    pub async fn retry_quiz(&self) -> Result<SessionState> {
        self.request_quiz(Operation::RetryQuiz, Stage::Result).await
    }

    /// Moves to the next catalog topic and fetches its explanation.
    ///
    /// Per-topic state is cleared before the remote call, so a failure
    /// leaves the session in `TopicSelection` with the error set.
    pub async fn advance_topic(&self) -> Result<SessionState> {
        let ticket = {
            let mut state = self.state.lock().await;
            let next = self.precondition(&mut state, Operation::AdvanceTopic, |s| {
                s.ensure_idle()?;
                s.ensure_stage(Operation::AdvanceTopic, &[Stage::Result])?;
                self.catalog
                    .next_after(s.topic.as_deref())
                    .map(ToString::to_string)
                    .ok_or(SessionError::EmptyCatalog)
            })?;

            let from = state.stage;
            state.reset();
            self.stage_changed(from, &state);
            self.begin(&mut state, Operation::AdvanceTopic, &next)
        };
        self.complete_explanation(ticket).await
    }

    /// Clears everything and returns to `TopicSelection`.
    ///
    /// Always succeeds. An operation still in flight keeps running but its
    /// response will be discarded.
    pub async fn reset(&self) -> SessionState {
        let mut state = self.state.lock().await;
        if let Some(pending) = &state.pending {
            info!(
                abandoned = %pending.operation,
                topic = %pending.topic,
                "Resetting session with an operation in flight"
            );
        }
        state.reset();
        info!("Session reset");
        self.events.send(SessionEvent::session_reset());
        state.clone()
    }

    /// Fetches the learner's attempt history. Does not touch the session.
    pub async fn list_progress(&self) -> Result<Vec<ProgressRecord>> {
        let records = self
            .gateway
            .list_progress()
            .await
            .map_err(|e| SessionError::remote(Operation::LoadProgress, e))?;
        debug!(count = records.len(), "Loaded progress");
        Ok(records)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn request_quiz(&self, operation: Operation, from_stage: Stage) -> Result<SessionState> {
        let ticket = {
            let mut state = self.state.lock().await;
            let topic = self.precondition(&mut state, operation, |s| {
                s.ensure_idle()?;
                s.ensure_stage(operation, &[from_stage])?;
                let topic = s.active_topic(operation)?;
                if s.is_exhausted() {
                    return Err(SessionError::attempts_exhausted(topic));
                }
                Ok(topic)
            })?;
            self.begin(&mut state, operation, &topic)
        };

        let outcome = self
            .gateway
            .generate_quiz(&ticket.topic)
            .await
            .and_then(|quiz| quiz.validate().map(|()| quiz));

        let mut state = self.state.lock().await;
        self.discard_if_stale(&state, &ticket)?;
        match outcome {
            Ok(quiz) => {
                let (count, relevance) = (quiz.len(), quiz.relevance_score);
                let from = state.stage;
                state.finish_quiz(&ticket, quiz)?;

                info!(
                    topic = %ticket.topic,
                    questions = count,
                    relevance,
                    "Quiz ready"
                );
                self.events
                    .send(SessionEvent::quiz_ready(&ticket.topic, count, relevance));
                self.stage_changed(from, &state);
                Ok(state.clone())
            }
            Err(source) => self.fail(&mut state, &ticket, source),
        }
    }

    async fn complete_explanation(&self, ticket: PendingOperation) -> Result<SessionState> {
        let outcome = self
            .gateway
            .explain(&ticket.topic)
            .await
            .and_then(|text| {
                if text.trim().is_empty() {
                    Err(GatewayError::invalid_response("explanation is empty"))
                } else {
                    Ok(text)
                }
            });

        let mut state = self.state.lock().await;
        self.discard_if_stale(&state, &ticket)?;
        match outcome {
            Ok(explanation) => {
                let from = state.stage;
                let length = explanation.len();
                state.finish_explanation(&ticket, explanation)?;

                info!(topic = %ticket.topic, length, "Explanation loaded");
                self.stage_changed(from, &state);
                Ok(state.clone())
            }
            Err(source) => self.fail(&mut state, &ticket, source),
        }
    }

    async fn fetch_reteach(&self, ticket: &PendingOperation) -> String {
        if !self.state.lock().await.is_current(ticket) {
            return String::new();
        }

        match self.gateway.reteach(&ticket.topic).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    topic = %ticket.topic,
                    error = %e,
                    "Reteach failed, continuing without a simplified explanation"
                );
                String::new()
            }
        }
    }

    fn precondition<T>(
        &self,
        state: &mut SessionState,
        operation: Operation,
        check: impl FnOnce(&SessionState) -> Result<T>,
    ) -> Result<T> {
        match check(state) {
            Ok(value) => Ok(value),
            Err(e) => Err(self.reject(state, operation, e)),
        }
    }

    fn reject(
        &self,
        state: &mut SessionState,
        operation: Operation,
        error: SessionError,
    ) -> SessionError {
        let error = state.reject(error);
        if error.is_contention() {
            debug!(operation = %operation, error = %error, "Operation rejected");
        } else {
            info!(operation = %operation, error = %error, "Operation rejected");
            self.events
                .send(SessionEvent::operation_failed(operation, error.to_string()));
        }
        error
    }

    fn begin(
        &self,
        state: &mut SessionState,
        operation: Operation,
        topic: &str,
    ) -> PendingOperation {
        let ticket = state.begin(operation, topic);
        info!(operation = %operation, topic = %topic, id = ticket.id, "Operation started");
        self.events.send(SessionEvent::operation_started(operation, topic));
        ticket
    }

    fn discard_if_stale(&self, state: &SessionState, ticket: &PendingOperation) -> Result<()> {
        if state.is_current(ticket) {
            return Ok(());
        }
        warn!(
            operation = %ticket.operation,
            topic = %ticket.topic,
            "Discarding response for an operation that was superseded"
        );
        Err(SessionError::Superseded {
            operation: ticket.operation,
        })
    }

    fn fail(
        &self,
        state: &mut SessionState,
        ticket: &PendingOperation,
        source: GatewayError,
    ) -> Result<SessionState> {
        let error = SessionError::remote(ticket.operation, source);
        warn!(
            operation = %ticket.operation,
            topic = %ticket.topic,
            error = %error,
            "Operation failed"
        );
        state.fail(ticket, error.to_string())?;
        self.events
            .send(SessionEvent::operation_failed(ticket.operation, error.to_string()));
        Err(error)
    }

    fn stage_changed(&self, from: Stage, state: &SessionState) {
        self.events.send(SessionEvent::stage_changed(
            from,
            state.stage,
            state.topic.clone(),
        ));
    }
}

// ============================================================================
// Tests
// ============================================================================
