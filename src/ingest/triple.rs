//! Ingestion input: extracted triples and the document they came from.

use serde::{Deserialize, Serialize};

use crate::facts::Provenance;

/// A predicate/object pair about the document's (implicit) subject taxon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    /// URI-like predicate; only the fragment after the last `#` matters.
    pub predicate: String,
    /// Object value.
    pub object: String,
}

impl Triple {
    /// Creates a triple.
    pub fn new(predicate: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// A triple with a blank predicate or object carries nothing to merge.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.predicate.trim().is_empty() || self.object.trim().is_empty()
    }
}

/// The harvested document a batch of triples was extracted from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    /// Repository path of the document.
    pub file_path: String,
    /// MIME type of the document content.
    pub mime_type: Option<String>,
    /// Info source identifier.
    pub info_source_id: String,
    /// Info source display name.
    pub info_source_name: Option<String>,
    /// Info source URL.
    #[serde(rename = "infoSourceURL")]
    pub info_source_url: Option<String>,
    /// Document identifier.
    pub document_id: String,
    /// Document title.
    pub title: Option<String>,
    /// Document identifier as published (e.g. a page URL).
    pub identifier: Option<String>,
}

impl SourceDocument {
    /// Creates a document with the required identifiers.
    pub fn new(
        file_path: impl Into<String>,
        info_source_id: impl Into<String>,
        document_id: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            info_source_id: info_source_id.into(),
            document_id: document_id.into(),
            ..Self::default()
        }
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Sets the publisher name and URL.
    #[must_use]
    pub fn publisher(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.info_source_name = Some(name.into());
        self.info_source_url = Some(url.into());
        self
    }

    /// Sets the title and published identifier.
    #[must_use]
    pub fn titled(mut self, title: impl Into<String>, identifier: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self.identifier = Some(identifier.into());
        self
    }

    /// Full provenance, as recorded on text properties and images.
    #[must_use]
    pub fn provenance(&self) -> Provenance {
        Provenance {
            info_source_id: Some(self.info_source_id.clone()),
            document_id: Some(self.document_id.clone()),
            info_source_name: self.info_source_name.clone(),
            info_source_url: self.info_source_url.clone(),
            title: self.title.clone(),
            identifier: self.identifier.clone(),
        }
    }

    /// Provenance without title and identifier, as recorded on common names
    /// and statuses.
    #[must_use]
    pub fn name_provenance(&self) -> Provenance {
        self.provenance().without_document_details()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_triples() {
        assert!(Triple::new("", "Wolf").is_blank());
        assert!(Triple::new("tc#hasCommonName", "  ").is_blank());
        assert!(!Triple::new("tc#hasCommonName", "Wolf").is_blank());
    }

    #[test]
    fn test_provenance_variants() {
        let doc = SourceDocument::new("/data/1013/42", "1013", "42")
            .publisher("Museum", "https://museum.example")
            .titled("Grey wolf", "https://museum.example/wolf");
        let full = doc.provenance();
        assert_eq!(full.title.as_deref(), Some("Grey wolf"));
        assert_eq!(full.document_id.as_deref(), Some("42"));

        let names = doc.name_provenance();
        assert!(names.title.is_none());
        assert!(names.identifier.is_none());
        assert_eq!(names.info_source_name.as_deref(), Some("Museum"));
    }
}
