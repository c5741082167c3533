//! In-memory tutoring gateway with scripted responses, for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::gateway::{EvaluateRequest, GatewayError, TutoringGateway};
use crate::session::{EvaluationResult, ProgressRecord, QuizQuestion, QuizSet};

type Script<T> = Mutex<VecDeque<Result<T, GatewayError>>>;

/// A call received by [`ScriptedGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Explain(String),
    GenerateQuiz(String),
    Evaluate(EvaluateRequest),
    Reteach(String),
    ListProgress,
}

/// Replays queued responses in order and records every call.
///
/// An exhausted queue answers with a transport error. After [`hold`], every
/// call blocks until [`release`] is called once for it.
///
/// [`hold`]: ScriptedGateway::hold
/// [`release`]: ScriptedGateway::release
#[derive(Default)]
pub struct ScriptedGateway {
    explanations: Script<String>,
    quizzes: Script<QuizSet>,
    evaluations: Script<EvaluationResult>,
    reteaches: Script<String>,
    progress: Script<Vec<ProgressRecord>>,
    calls: Mutex<Vec<Call>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl ScriptedGateway {
    pub fn push_explanation(&self, response: Result<String, GatewayError>) {
        self.explanations.lock().unwrap().push_back(response);
    }

    pub fn push_quiz(&self, response: Result<QuizSet, GatewayError>) {
        self.quizzes.lock().unwrap().push_back(response);
    }

    pub fn push_evaluation(&self, response: Result<EvaluationResult, GatewayError>) {
        self.evaluations.lock().unwrap().push_back(response);
    }

    pub fn push_reteach(&self, response: Result<String, GatewayError>) {
        self.reteaches.lock().unwrap().push_back(response);
    }

    pub fn push_progress(&self, response: Result<Vec<ProgressRecord>, GatewayError>) {
        self.progress.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            gate.add_permits(1);
        }
    }

    async fn answer<T>(&self, call: Call, script: &Script<T>) -> Result<T, GatewayError> {
        self.calls.lock().unwrap().push(call);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::transport("no scripted response")))
    }
}

#[async_trait]
impl TutoringGateway for ScriptedGateway {
    async fn explain(&self, topic: &str) -> Result<String, GatewayError> {
        self.answer(Call::Explain(topic.to_string()), &self.explanations).await
    }

    async fn generate_quiz(&self, topic: &str) -> Result<QuizSet, GatewayError> {
        self.answer(Call::GenerateQuiz(topic.to_string()), &self.quizzes).await
    }

    async fn evaluate(&self, request: &EvaluateRequest) -> Result<EvaluationResult, GatewayError> {
        self.answer(Call::Evaluate(request.clone()), &self.evaluations).await
    }

    async fn reteach(&self, topic: &str) -> Result<String, GatewayError> {
        self.answer(Call::Reteach(topic.to_string()), &self.reteaches).await
    }

    async fn list_progress(&self) -> Result<Vec<ProgressRecord>, GatewayError> {
        self.answer(Call::ListProgress, &self.progress).await
    }
}

/// A quiz with `questions` four-option questions; question `i` expects `i % 4`.
pub fn quiz(questions: usize, relevance_score: u8) -> QuizSet {
    QuizSet {
        questions: (0..questions)
            .map(|i| QuizQuestion {
                question: format!("Question {}?", i + 1),
                options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
                answer_index: i % 4,
            })
            .collect(),
        relevance_score,
    }
}

pub const fn evaluation(
    score: u8,
    attempt_number: u32,
    max_attempts_reached: bool,
) -> EvaluationResult {
    EvaluationResult {
        score,
        attempt_number,
        max_attempts_reached,
    }
}
