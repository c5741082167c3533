//! Configuration types for the mastery tutor.
//!
//! Settings are read from `mastery.json` with camelCase keys. Every key has a
//! default, so a missing file is the same as an empty object.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::CANONICAL_TOPICS;
use crate::error::{Result, SessionError};

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "mastery.json";

/// Largest display offset accepted, in minutes (UTC+14:00).
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Default base URL of the tutoring backend.
fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

/// Default per-request timeout in seconds. Generation calls can be slow.
const fn default_request_timeout_secs() -> u64 {
    60
}

fn default_topics() -> Vec<String> {
    CANONICAL_TOPICS.iter().map(ToString::to_string).collect()
}

const fn default_true() -> bool {
    true
}

/// Default port for `mastery serve`.
const fn default_port() -> u16 {
    3000
}

/// Default capacity of the session event channel.
const fn default_event_capacity() -> usize {
    100
}

/// Main configuration for the tutor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the tutoring backend.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Timeout for each backend request in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Topic catalog offered to the learner, in advance order.
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,

    /// Whether the quiz's correct answers are forwarded to `evaluate`.
    #[serde(default = "default_true")]
    pub send_correct_answers: bool,

    /// Port the local API listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Capacity of the session event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Offset from UTC used when displaying attempt timestamps.
    #[serde(default)]
    pub display_utc_offset_minutes: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            request_timeout_secs: default_request_timeout_secs(),
            topics: default_topics(),
            send_correct_answers: default_true(),
            port: default_port(),
            event_capacity: default_event_capacity(),
            display_utc_offset_minutes: 0,
        }
    }
}

impl Config {
    /// Loads configuration from `mastery.json` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable, malformed or
    /// fails validation.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            SessionError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `mastery.json` in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable, malformed or
    /// fails validation.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the (validated) defaults.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ConfigParseError` if the file cannot be read or
    /// is not valid JSON, and `SessionError::ConfigValidationError` if a value
    /// is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(SessionError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| SessionError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ConfigValidationError` for the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let url = self.backend_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SessionError::config_validation(
                format!("backendUrl '{}' is not an http(s) URL", self.backend_url),
                "Set backendUrl to something like \"http://localhost:8000\" in your mastery.json",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(SessionError::config_validation(
                "requestTimeoutSecs must be greater than 0",
                "Set requestTimeoutSecs to at least 1 second in your mastery.json",
            ));
        }

        if self.topics.is_empty() {
            return Err(SessionError::config_validation(
                "topics must not be empty",
                "Add at least one topic to the topics list, or remove the key to use the built-in catalog",
            ));
        }

        let mut seen = HashSet::new();
        for topic in &self.topics {
            let key = topic.trim().to_lowercase();
            if key.is_empty() {
                return Err(SessionError::config_validation(
                    "topics must not contain blank entries",
                    "Remove empty strings from the topics list in your mastery.json",
                ));
            }
            if !seen.insert(key) {
                return Err(SessionError::config_validation(
                    format!("topic '{}' is listed more than once", topic.trim()),
                    "Remove the duplicate entry from the topics list in your mastery.json",
                ));
            }
        }

        if self.event_capacity == 0 {
            return Err(SessionError::config_validation(
                "eventCapacity must be greater than 0",
                "Set eventCapacity to at least 1 in your mastery.json",
            ));
        }

        if self.display_utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(SessionError::config_validation(
                format!(
                    "displayUtcOffsetMinutes {} is outside -{MAX_UTC_OFFSET_MINUTES}..={MAX_UTC_OFFSET_MINUTES}",
                    self.display_utc_offset_minutes
                ),
                "Use the offset in minutes, e.g. 330 for UTC+05:30",
            ));
        }

        Ok(())
    }
}
