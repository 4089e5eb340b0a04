//! Controlled status vocabularies.
//!
//! The vocabulary is an external collaborator: it knows the canonical terms
//! for each status category and how each source's raw values map onto them.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Status categories with a controlled vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusType {
    /// Conservation status (threatened species lists).
    Conservation,
    /// Pest status (declared pests and weeds).
    Pest,
}

impl StatusType {
    /// Index field holding the matched terms.
    #[must_use]
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::Conservation => "conservationStatus",
            Self::Pest => "pestStatus",
        }
    }
}

impl fmt::Display for StatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Vocabulary lookups consumed by ingestion, indexing and queries.
pub trait Vocabulary: Send + Sync {
    /// Canonical terms for a category, in vocabulary order.
    fn terms_for_status(&self, status: StatusType) -> Vec<String>;

    /// Maps a source's raw value to a canonical term, if a mapping exists.
    fn map_status(&self, source_id: &str, status: StatusType, raw: &str) -> Option<String>;
}

/// Vocabulary held in memory.
///
/// Raw-value mappings are matched case-insensitively after trimming.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVocabulary {
    terms: HashMap<StatusType, Vec<String>>,
    mappings: HashMap<(String, StatusType, String), String>,
}

impl InMemoryVocabulary {
    /// Creates an empty vocabulary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the canonical terms for a category.
    #[must_use]
    pub fn with_terms<I, S>(mut self, status: StatusType, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terms
            .insert(status, terms.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a raw-value mapping for one source.
    #[must_use]
    pub fn with_mapping(
        mut self,
        source_id: impl Into<String>,
        status: StatusType,
        raw: &str,
        term: impl Into<String>,
    ) -> Self {
        self.mappings.insert(
            (source_id.into(), status, raw.trim().to_lowercase()),
            term.into(),
        );
        self
    }
}

impl Vocabulary for InMemoryVocabulary {
    fn terms_for_status(&self, status: StatusType) -> Vec<String> {
        self.terms.get(&status).cloned().unwrap_or_default()
    }

    fn map_status(&self, source_id: &str, status: StatusType, raw: &str) -> Option<String> {
        self.mappings
            .get(&(source_id.to_string(), status, raw.trim().to_lowercase()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terms_and_mapping() {
        let vocab = InMemoryVocabulary::new()
            .with_terms(StatusType::Conservation, ["Endangered", "Vulnerable"])
            .with_mapping("1013", StatusType::Conservation, "EN", "Endangered");

        assert_eq!(
            vocab.terms_for_status(StatusType::Conservation),
            vec!["Endangered", "Vulnerable"]
        );
        assert!(vocab.terms_for_status(StatusType::Pest).is_empty());
        assert_eq!(
            vocab.map_status("1013", StatusType::Conservation, " en "),
            Some("Endangered".to_string())
        );
        assert_eq!(vocab.map_status("9999", StatusType::Conservation, "EN"), None);
        assert_eq!(vocab.map_status("1013", StatusType::Pest, "EN"), None);
    }
}
