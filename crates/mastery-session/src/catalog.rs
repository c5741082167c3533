//! Topic catalog and topic text normalization.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Built-in topics, in the order the learner advances through them.
pub const CANONICAL_TOPICS: [&str; 10] = [
    "Artificial Intelligence",
    "Machine Learning",
    "Deep Learning",
    "Neural Networks",
    "Natural Language Processing",
    "Computer Vision",
    "Reinforcement Learning",
    "Generative AI",
    "Transformers",
    "Diffusion Models",
];

/// Trims a topic and collapses internal whitespace runs to one space.
///
/// # Examples
///
/// ```
/// use mastery_session::normalize_topic;
///
/// assert_eq!(normalize_topic("  Deep \t  Learning \n"), "Deep Learning");
/// assert_eq!(normalize_topic("   "), "");
/// ```
#[must_use]
pub fn normalize_topic(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(re) = Regex::new(r"\s+") else {
        return trimmed.to_string();
    };
    re.replace_all(trimmed, " ").into_owned()
}

/// Ordered list of topics the learner can pick from and advance through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCatalog {
    topics: Vec<String>,
}

impl Default for TopicCatalog {
    fn default() -> Self {
        Self::new(CANONICAL_TOPICS.iter().map(ToString::to_string))
    }
}

impl TopicCatalog {
    /// Builds a catalog, normalizing entries and dropping blank ones.
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            topics: topics
                .into_iter()
                .map(|t| normalize_topic(t.as_ref()))
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Returns the topics in order.
    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Returns `true` if the catalog has no topics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Finds the catalog position of `topic`, ignoring case and spacing.
    #[must_use]
    pub fn position(&self, topic: &str) -> Option<usize> {
        let wanted = normalize_topic(topic).to_lowercase();
        self.topics.iter().position(|t| t.to_lowercase() == wanted)
    }

    /// Picks the topic to learn: free text wins while it is non-empty,
    /// otherwise the catalog choice.
    ///
    /// # Examples
    ///
    /// ```
    /// use mastery_session::TopicCatalog;
    ///
    /// let catalog = TopicCatalog::default();
    /// assert_eq!(
    ///     catalog.resolve(Some(" Graph  Theory "), Some("Transformers")).as_deref(),
    ///     Some("Graph Theory")
    /// );
    /// assert_eq!(
    ///     catalog.resolve(Some("   "), Some("Transformers")).as_deref(),
    ///     Some("Transformers")
    /// );
    /// assert_eq!(catalog.resolve(None, None), None);
    /// ```
    #[must_use]
    pub fn resolve(&self, free_text: Option<&str>, catalog_choice: Option<&str>) -> Option<String> {
        let typed = free_text.map(normalize_topic).unwrap_or_default();
        if !typed.is_empty() {
            return Some(typed);
        }

        let chosen = catalog_choice.map(normalize_topic).unwrap_or_default();
        if chosen.is_empty() {
            return None;
        }
        Some(
            self.position(&chosen)
                .map_or(chosen, |i| self.topics[i].clone()),
        )
    }

    /// Returns the topic after `current`, wrapping at the end.
    ///
    /// A current topic that is not in the catalog (or none at all) advances
    /// to the first entry. An empty catalog has no next topic.
    #[must_use]
    pub fn next_after(&self, current: Option<&str>) -> Option<&str> {
        if self.topics.is_empty() {
            return None;
        }
        let next = current
            .and_then(|c| self.position(c))
            .map_or(0, |i| (i + 1) % self.topics.len());
        self.topics.get(next).map(String::as_str)
    }
}
