//! Session events and their WebSocket stream.
//!
//! The controller publishes a [`SessionEvent`] after every step so that
//! presentation layers can observe the session instead of polling it.
//! Events are serialized as `{"event": name, "payload": {...}}`.
//!
//! # Event Types
//!
//! - `connected` - Sent to a WebSocket client on connect, with the current state
//! - `operation_started` - A remote operation began
//! - `stage_changed` - The session moved to another stage
//! - `quiz_ready` - A quiz was installed
//! - `answer_recorded` - The learner picked an option
//! - `evaluated` - A quiz was graded
//! - `operation_failed` - An operation was rejected or failed
//! - `session_reset` - The session returned to topic selection
//!
//! # Example
//!
//! ```
//! use mastery_session::websocket::{EventBroadcaster, SessionEvent};
//! use mastery_session::Operation;
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(16);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::operation_started(Operation::StartQuiz, "Transformers"));
//!
//! if let Ok(event) = receiver.recv().await {
//!     assert_eq!(event.event_name(), "operation_started");
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::session::{EvaluationResult, Operation, SessionState, Stage};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The current session state.
    pub state: SessionState,
}

/// Payload for the `operation_started` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationStartedPayload {
    /// The operation now in flight.
    pub operation: Operation,
    /// The topic it was issued for.
    pub topic: String,
    /// When it started.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `stage_changed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageChangedPayload {
    /// Stage before the transition.
    pub from: Stage,
    /// Stage after the transition.
    pub to: Stage,
    /// Active topic after the transition.
    pub topic: Option<String>,
}

/// Payload for the `quiz_ready` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizReadyPayload {
    /// Topic of the quiz.
    pub topic: String,
    /// Number of questions.
    pub question_count: usize,
    /// Advisory relevance score.
    pub relevance_score: u8,
}

/// Payload for the `answer_recorded` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecordedPayload {
    /// Question index.
    pub question: usize,
    /// Selected option index.
    pub option: usize,
    /// Questions still unanswered.
    pub unanswered: usize,
}

/// Payload for the `evaluated` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedPayload {
    /// Topic that was graded.
    pub topic: String,
    /// The grading result.
    pub result: EvaluationResult,
    /// Whether the score meets the mastery threshold.
    pub passed: bool,
    /// Whether a simplified explanation is available.
    pub retaught: bool,
}

/// Payload for the `operation_failed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationFailedPayload {
    /// The operation that failed.
    pub operation: Operation,
    /// Message shown to the learner.
    pub message: String,
}

/// Payload for the `session_reset` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResetPayload {
    /// When the reset happened.
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Events published while a session runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent when a WebSocket client connects.
    Connected(ConnectedPayload),
    /// Sent when a remote operation begins.
    OperationStarted(OperationStartedPayload),
    /// Sent when the stage changes.
    StageChanged(StageChangedPayload),
    /// Sent when a quiz is installed.
    QuizReady(QuizReadyPayload),
    /// Sent when an answer is recorded.
    AnswerRecorded(AnswerRecordedPayload),
    /// Sent when a quiz has been graded.
    Evaluated(EvaluatedPayload),
    /// Sent when an operation is rejected or fails.
    OperationFailed(OperationFailedPayload),
    /// Sent when the session is reset.
    SessionReset(SessionResetPayload),
}

impl SessionEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(state: SessionState) -> Self {
        Self::Connected(ConnectedPayload { state })
    }

    /// Creates an `OperationStarted` event.
    #[must_use]
    pub fn operation_started(operation: Operation, topic: impl Into<String>) -> Self {
        Self::OperationStarted(OperationStartedPayload {
            operation,
            topic: topic.into(),
            timestamp: Utc::now(),
        })
    }

    /// Creates a `StageChanged` event.
    #[must_use]
    pub const fn stage_changed(from: Stage, to: Stage, topic: Option<String>) -> Self {
        Self::StageChanged(StageChangedPayload { from, to, topic })
    }

    /// Creates a `QuizReady` event.
    #[must_use]
    pub fn quiz_ready(
        topic: impl Into<String>,
        question_count: usize,
        relevance_score: u8,
    ) -> Self {
        Self::QuizReady(QuizReadyPayload {
            topic: topic.into(),
            question_count,
            relevance_score,
        })
    }

    /// Creates an `AnswerRecorded` event.
    #[must_use]
    pub const fn answer_recorded(question: usize, option: usize, unanswered: usize) -> Self {
        Self::AnswerRecorded(AnswerRecordedPayload {
            question,
            option,
            unanswered,
        })
    }

    /// Creates an `Evaluated` event.
    #[must_use]
    pub fn evaluated(topic: impl Into<String>, result: EvaluationResult, retaught: bool) -> Self {
        Self::Evaluated(EvaluatedPayload {
            topic: topic.into(),
            passed: result.passed(),
            result,
            retaught,
        })
    }

    /// Creates an `OperationFailed` event.
    #[must_use]
    pub fn operation_failed(operation: Operation, message: impl Into<String>) -> Self {
        Self::OperationFailed(OperationFailedPayload {
            operation,
            message: message.into(),
        })
    }

    /// Creates a `SessionReset` event.
    #[must_use]
    pub fn session_reset() -> Self {
        Self::SessionReset(SessionResetPayload {
            timestamp: Utc::now(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::OperationStarted(_) => "operation_started",
            Self::StageChanged(_) => "stage_changed",
            Self::QuizReady(_) => "quiz_ready",
            Self::AnswerRecorded(_) => "answer_recorded",
            Self::Evaluated(_) => "evaluated",
            Self::OperationFailed(_) => "operation_failed",
            Self::SessionReset(_) => "session_reset",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Fans session events out to every subscriber.
///
/// Events are not kept for subscribers that join later.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls more than `capacity` events behind receives
    /// a `Lagged` error and misses those events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event, returning how many subscribers will receive it.
    pub fn send(&self, event: SessionEvent) -> usize {
        // Err only means nobody is listening
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// Upgrades `GET /ws` to a WebSocket streaming session events.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    debug!("Upgrading event stream connection");
    ws.on_upgrade(move |socket| stream_events(socket, state))
}

/// Why a client stream ended.
#[derive(Debug, Clone, Copy)]
enum Disconnect {
    ClientClosed,
    SendFailed,
    Unresponsive,
    ChannelClosed,
}

/// Streams session events to one client.
///
/// Sends `connected` with the current state, then forwards every broadcast
/// event. Pings every 30 seconds and closes after 3 unanswered pings.
async fn stream_events(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut incoming) = socket.split();

    // Subscribe before taking the snapshot so no event falls in between
    let mut events = state.controller.subscribe();
    let snapshot = state.controller.snapshot().await;
    let stage = snapshot.stage;

    if !forward(&mut sink, &SessionEvent::connected(snapshot)).await {
        debug!("Client left before the session snapshot was sent");
        return;
    }
    info!(%stage, "Event stream client connected");

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut unanswered_pings = 0u8;

    let reason = loop {
        tokio::select! {
            frame = incoming.next() => match frame {
                Some(Ok(Message::Pong(_))) => unanswered_pings = 0,
                Some(Ok(Message::Ping(payload))) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        break Disconnect::SendFailed;
                    }
                }
                Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                    debug!("Ignoring inbound frame; the event stream is one-way");
                }
                Some(Ok(Message::Close(_))) | None => break Disconnect::ClientClosed,
                Some(Err(e)) => {
                    debug!(error = %e, "Event stream read failed");
                    break Disconnect::ClientClosed;
                }
            },

            received = events.recv() => match received {
                Ok(event) => {
                    if !forward(&mut sink, &event).await {
                        break Disconnect::SendFailed;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream client fell behind; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break Disconnect::ChannelClosed,
            },

            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break Disconnect::SendFailed;
                }
                unanswered_pings += 1;
                if unanswered_pings >= MAX_MISSED_PONGS {
                    break Disconnect::Unresponsive;
                }
            }
        }
    };

    info!(?reason, "Event stream client disconnected");
}

/// Serializes and sends one event. Returns `false` once the client is gone.
async fn forward(sink: &mut SplitSink<WebSocket, Message>, event: &SessionEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => sink.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            warn!(event = event.event_name(), error = %e, "Could not serialize session event");
            true
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
