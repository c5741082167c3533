//! Mastery Loop Progress Reports
//!
//! Builds a learner's progress report from the attempt history returned by
//! the tutoring backend: overall statistics, a per-topic summary and the
//! attempt history, rendered as JSON or Markdown.
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Compact or pretty JSON
//! - [`MarkdownGenerator`] - Human-readable Markdown
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use mastery_report::{AttemptInput, ProgressReport};
//! use mastery_report::json::JsonGenerator;
//!
//! let attempts = vec![AttemptInput {
//!     topic: "Transformers".to_string(),
//!     attempt_number: 1,
//!     score: 80,
//!     date: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
//! }];
//!
//! let report = ProgressReport::from_attempts(attempts, 330).unwrap();
//! assert_eq!(report.stats.passed, 1);
//!
//! let json = JsonGenerator::new(&report).generate_pretty().unwrap();
//! assert!(json.contains("\"averageScore\": 80"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum score (inclusive) that counts as a pass.
pub const PASS_THRESHOLD: u8 = 70;

/// Attempts after which an unmastered topic is locked by the backend.
pub const MAX_ATTEMPTS: u32 = 3;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid report data.
    #[error("invalid report data: {0}")]
    InvalidData(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Input (local copy to avoid cross-crate dependency)
// ============================================================================

/// One graded attempt.
///
/// Mirrors the session crate's progress record so this crate stays
/// independent of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptInput {
    /// Topic of the attempt.
    pub topic: String,
    /// Attempt number for the topic (1-based).
    pub attempt_number: u32,
    /// Percentage score.
    pub score: u8,
    /// When the attempt was graded.
    pub date: DateTime<Utc>,
}

impl AttemptInput {
    /// Returns `true` if the attempt met the pass threshold.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.score >= PASS_THRESHOLD
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Dashboard statistics across every attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStats {
    /// Number of graded attempts.
    pub total_attempts: usize,
    /// Attempts scoring at least the pass threshold.
    pub passed: usize,
    /// Attempts below the pass threshold.
    pub failed: usize,
    /// Mean score rounded half up; 0 when there are no attempts.
    pub average_score: u8,
}

impl ProgressStats {
    /// Computes statistics for `attempts`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Utc;
    /// use mastery_report::{AttemptInput, ProgressStats};
    ///
    /// let attempt = |score| AttemptInput {
    ///     topic: "Rust".to_string(),
    ///     attempt_number: 1,
    ///     score,
    ///     date: Utc::now(),
    /// };
    ///
    /// let stats = ProgressStats::from_attempts(&[attempt(55), attempt(70), attempt(90)]);
    /// assert_eq!(stats.passed, 2);
    /// assert_eq!(stats.failed, 1);
    /// assert_eq!(stats.average_score, 72);
    ///
    /// assert_eq!(ProgressStats::from_attempts(&[]).average_score, 0);
    /// ```
    #[must_use]
    pub fn from_attempts(attempts: &[AttemptInput]) -> Self {
        let total_attempts = attempts.len();
        let passed = attempts.iter().filter(|a| a.passed()).count();

        let sum: u64 = attempts.iter().map(|a| u64::from(a.score)).sum();
        let count = u64::try_from(total_attempts).unwrap_or(u64::MAX);
        let average = if count == 0 {
            0
        } else {
            (sum * 2 + count) / (count * 2)
        };

        Self {
            total_attempts,
            passed,
            failed: total_attempts - passed,
            average_score: u8::try_from(average).unwrap_or(u8::MAX),
        }
    }
}

// ============================================================================
// Topic Summary
// ============================================================================

/// Where the learner stands on one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    /// At least one attempt passed.
    Mastered,
    /// Every allowed attempt was used without passing.
    Exhausted,
    /// Attempts remain.
    InProgress,
}

impl TopicStatus {
    /// Returns a short label for display.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Mastered => "Mastered",
            Self::Exhausted => "Attempts exhausted",
            Self::InProgress => "In progress",
        }
    }
}

impl std::fmt::Display for TopicStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Summary of every attempt at one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSummary {
    /// The topic.
    pub topic: String,
    /// Number of recorded attempts.
    pub attempts: usize,
    /// Best score achieved.
    pub best_score: u8,
    /// Score of the most recent attempt.
    pub latest_score: u8,
    /// When the most recent attempt was graded.
    pub last_attempt_at: DateTime<Utc>,
    /// Derived standing.
    pub status: TopicStatus,
}

// ============================================================================
// ProgressReport
// ============================================================================

/// Complete progress report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    /// When the report was built.
    pub generated_at: DateTime<Utc>,
    /// Offset from UTC used for displayed timestamps.
    pub display_utc_offset_minutes: i32,
    /// Overall statistics.
    pub stats: ProgressStats,
    /// One entry per topic, most recently practiced first.
    pub topics: Vec<TopicSummary>,
    /// Every attempt, newest first.
    pub history: Vec<AttemptInput>,
}

impl ProgressReport {
    /// Builds a report from attempts in any order.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidData` if the display offset is not a
    /// valid UTC offset.
    pub fn from_attempts(
        mut attempts: Vec<AttemptInput>,
        display_utc_offset_minutes: i32,
    ) -> Result<Self> {
        offset_from_minutes(display_utc_offset_minutes)?;

        attempts.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.attempt_number.cmp(&a.attempt_number))
        });

        Ok(Self {
            generated_at: Utc::now(),
            display_utc_offset_minutes,
            stats: ProgressStats::from_attempts(&attempts),
            topics: summarize_topics(&attempts),
            history: attempts,
        })
    }

    /// Returns the display offset.
    ///
    /// Falls back to UTC if the stored offset is out of range.
    #[must_use]
    pub fn display_offset(&self) -> FixedOffset {
        offset_from_minutes(self.display_utc_offset_minutes).unwrap_or_else(|_| Utc.fix())
    }

    /// Formats a timestamp in the display offset, e.g. `2026-03-01 15:30 (UTC+05:30)`.
    #[must_use]
    pub fn format_timestamp(&self, timestamp: &DateTime<Utc>) -> String {
        let local = timestamp.with_timezone(&self.display_offset());
        format!("{} (UTC{})", local.format("%Y-%m-%d %H:%M"), local.format("%:z"))
    }
}

fn offset_from_minutes(minutes: i32) -> Result<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            ReportError::InvalidData(format!("display offset of {minutes} minutes is out of range"))
        })
}

/// Groups newest-first attempts by topic, keeping first-seen order.
fn summarize_topics(newest_first: &[AttemptInput]) -> Vec<TopicSummary> {
    let mut summaries: Vec<(TopicSummary, u32)> = Vec::new();

    for attempt in newest_first {
        if let Some((summary, highest_attempt)) =
            summaries.iter_mut().find(|(s, _)| s.topic == attempt.topic)
        {
            summary.attempts += 1;
            summary.best_score = summary.best_score.max(attempt.score);
            *highest_attempt = (*highest_attempt).max(attempt.attempt_number);
        } else {
            summaries.push((
                TopicSummary {
                    topic: attempt.topic.clone(),
                    attempts: 1,
                    best_score: attempt.score,
                    latest_score: attempt.score,
                    last_attempt_at: attempt.date,
                    status: TopicStatus::InProgress,
                },
                attempt.attempt_number,
            ));
        }
    }

    summaries
        .into_iter()
        .map(|(mut summary, highest_attempt)| {
            summary.status = if summary.best_score >= PASS_THRESHOLD {
                TopicStatus::Mastered
            } else if highest_attempt >= MAX_ATTEMPTS {
                TopicStatus::Exhausted
            } else {
                TopicStatus::InProgress
            };
            summary
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
