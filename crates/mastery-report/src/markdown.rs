//! Markdown progress report generation.
//!
//! The generated document contains:
//!
//! - A summary table with overall statistics
//! - One row per practiced topic with its standing
//! - The attempt history, newest first
//!
//! # Example
//!
//! ```rust
//! use mastery_report::{MarkdownGenerator, ProgressReport};
//!
//! let report = ProgressReport::from_attempts(vec![], 0).unwrap();
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# Learning Progress Report"));
//! assert!(markdown.contains("*No attempts recorded yet.*"));
//! ```

use chrono::Utc;
use std::fmt::Write;

use crate::{AttemptInput, ProgressReport, TopicSummary, MAX_ATTEMPTS};

/// Generates Markdown reports from a learner's progress.
pub struct MarkdownGenerator<'a> {
    report: &'a ProgressReport,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a ProgressReport) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report, footer included.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        Self::write_title(&mut output);
        self.write_summary(&mut output);
        self.write_topics(&mut output);
        self.write_history(&mut output);
        self.write_footer(&mut output);

        output
    }

    fn write_title(output: &mut String) {
        let _ = writeln!(output, "# Learning Progress Report\n");
    }

    fn write_summary(&self, output: &mut String) {
        let stats = &self.report.stats;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Attempts | {} |", stats.total_attempts);
        let _ = writeln!(output, "| Passed | {} |", stats.passed);
        let _ = writeln!(output, "| Failed | {} |", stats.failed);
        let _ = writeln!(output, "| Average Score | {}% |", stats.average_score);
        let _ = writeln!(output, "| Topics Practiced | {} |", self.report.topics.len());
        let _ = writeln!(
            output,
            "| Times Shown In | UTC{} |",
            self.report.display_offset()
        );
        let _ = writeln!(output);
    }

    fn write_topics(&self, output: &mut String) {
        let _ = writeln!(output, "## Topics\n");

        if self.report.topics.is_empty() {
            let _ = writeln!(output, "*No topics practiced yet.*\n");
            return;
        }

        let _ = writeln!(output, "| Topic | Attempts | Best | Latest | Status |");
        let _ = writeln!(output, "|-------|----------|------|--------|--------|");
        for topic in &self.report.topics {
            Self::write_topic_row(output, topic);
        }
        let _ = writeln!(output);
    }

    fn write_topic_row(output: &mut String, topic: &TopicSummary) {
        let _ = writeln!(
            output,
            "| {} | {} | {}% | {}% | {} |",
            escape_markdown(&topic.topic),
            topic.attempts,
            topic.best_score,
            topic.latest_score,
            topic.status
        );
    }

    fn write_history(&self, output: &mut String) {
        let _ = writeln!(output, "## Attempt History\n");

        if self.report.history.is_empty() {
            let _ = writeln!(output, "*No attempts recorded yet.*\n");
            return;
        }

        let _ = writeln!(output, "| Date | Topic | Attempt | Score | Result |");
        let _ = writeln!(output, "|------|-------|---------|-------|--------|");
        for attempt in &self.report.history {
            self.write_history_row(output, attempt);
        }
        let _ = writeln!(output);
    }

    fn write_history_row(&self, output: &mut String, attempt: &AttemptInput) {
        let _ = writeln!(
            output,
            "| {} | {} | {} of {} | {}% | {} |",
            self.report.format_timestamp(&attempt.date),
            escape_markdown(&attempt.topic),
            attempt.attempt_number,
            MAX_ATTEMPTS,
            attempt.score,
            if attempt.passed() { "Passed" } else { "Failed" }
        );
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = self.report.format_timestamp(&Utc::now());
        let _ = writeln!(output, "*Generated by Mastery Loop at {timestamp}*");
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Escapes characters that would break Markdown table cells.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
