//! JSON progress report generation.
//!
//! # Example
//!
//! ```rust
//! use mastery_report::ProgressReport;
//! use mastery_report::json::JsonGenerator;
//!
//! let report = ProgressReport::from_attempts(vec![], 0).unwrap();
//! let generator = JsonGenerator::new(&report);
//!
//! let compact = generator.generate().unwrap();
//! assert!(!compact.contains('\n'));
//!
//! // generator.write_to_file(std::path::Path::new("progress.json"), true).unwrap();
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{ProgressReport, ReportError, Result};

/// JSON report generator.
pub struct JsonGenerator<'a> {
    report: &'a ProgressReport,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a new JSON generator for the given report.
    #[must_use]
    pub const fn new(report: &'a ProgressReport) -> Self {
        Self { report }
    }

    /// Generates compact JSON output (single line).
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.report).map_err(ReportError::from)
    }

    /// Generates pretty-printed JSON output with 2-space indentation.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.report).map_err(ReportError::from)
    }

    /// Writes the JSON report to `path`, creating or overwriting it.
    ///
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    /// Returns [`ReportError::Io`] if file creation or writing fails.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::AttemptInput;

    fn sample_report() -> ProgressReport {
        let attempts = vec![
            AttemptInput {
                topic: "Transformers".to_string(),
                attempt_number: 1,
                score: 45,
                date: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            },
            AttemptInput {
                topic: "Transformers".to_string(),
                attempt_number: 2,
                score: 90,
                date: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
            },
        ];
        ProgressReport::from_attempts(attempts, 330).unwrap()
    }

    #[test]
    fn test_generate_compact() {
        let json = JsonGenerator::new(&sample_report()).generate().unwrap();

        assert!(!json.contains('\n'));
        assert!(json.contains(r#""stats":{"totalAttempts":2,"passed":1,"failed":1,"averageScore":68}"#));
        assert!(json.contains(r#""displayUtcOffsetMinutes":330"#));
    }

    #[test]
    fn test_generate_pretty_round_trips() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate_pretty().unwrap();

        assert!(json.contains("\n  \"stats\""));
        let parsed: ProgressReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_topic_status_serialized_snake_case() {
        let json = JsonGenerator::new(&sample_report()).generate().unwrap();
        assert!(json.contains(r#""status":"mastered""#));
        assert!(json.contains(r#""bestScore":90"#));
    }

    #[test]
    fn test_write_to_file() {
        let path = std::env::temp_dir().join("test_mastery_progress.json");
        let report = sample_report();

        JsonGenerator::new(&report).write_to_file(&path, false).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains(r#""topic":"Transformers""#));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let report = sample_report();
        let err = JsonGenerator::new(&report)
            .write_to_file(Path::new("/nonexistent/dir/progress.json"), true)
            .unwrap_err();
        assert!(matches!(err, ReportError::Io(_)));
    }
}
