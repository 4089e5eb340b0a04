//! Attribute facts attached to a taxon concept.
//!
//! Every value object carries [`Provenance`] so that a fact can always be
//! traced back to the source document it was extracted from. Facts are
//! stored as JSON lists, one list per fact type, under the concept's row.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Where a fact came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// Info source (data provider) identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_source_id: Option<String>,
    /// Identifier of the harvested document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Human-readable publisher name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_source_name: Option<String>,
    /// Source URL.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "infoSourceURL")]
    pub info_source_url: Option<String>,
    /// Document title, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Document identifier (e.g. a page URL), if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl Provenance {
    /// Provenance naming only an info source.
    #[must_use]
    pub fn from_source(info_source_id: impl Into<String>) -> Self {
        Self {
            info_source_id: Some(info_source_id.into()),
            ..Self::default()
        }
    }

    /// Copy without title/identifier, as recorded for names and statuses.
    #[must_use]
    pub fn without_document_details(&self) -> Self {
        Self {
            title: None,
            identifier: None,
            ..self.clone()
        }
    }
}

/// A vernacular name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonName {
    /// The name as published.
    pub name_string: String,
    /// Source of the name.
    #[serde(flatten)]
    pub provenance: Provenance,
}

impl CommonName {
    /// Creates a common name.
    #[must_use]
    pub fn new(name: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            name_string: name.into(),
            provenance,
        }
    }
}

/// A conservation or pest status assertion.
///
/// `status` is the controlled vocabulary term when the source value could
/// be mapped, otherwise the raw value verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFact {
    /// Status term.
    pub status: String,
    /// Raw value as supplied, when it differs from `status`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_status: Option<String>,
    /// Source of the status.
    #[serde(flatten)]
    pub provenance: Provenance,
}

impl StatusFact {
    /// Creates a status fact.
    #[must_use]
    pub fn new(status: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            status: status.into(),
            raw_status: None,
            provenance,
        }
    }
}

/// Conservation status (e.g. "Endangered").
pub type ConservationStatus = StatusFact;

/// Pest status (e.g. "Declared pest").
pub type PestStatus = StatusFact;

/// Whether a taxon is extant, extinct, etc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtantStatus {
    /// Status value.
    pub status: String,
    /// Source of the status.
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// Habitat classification (e.g. "Terrestrial", "Marine").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habitat {
    /// Habitat value.
    pub status: String,
    /// Source of the habitat.
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// A region a taxon occurs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    /// Region name.
    pub name: String,
    /// Region type (state, IBRA region, country, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_type: Option<String>,
    /// Occurrence count, when supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<u64>,
    /// Source of the region record.
    #[serde(flatten)]
    pub provenance: Provenance,
}

impl Region {
    /// Groups regions by type; regions without a type land under `"other"`.
    #[must_use]
    pub fn group_by_type(regions: &[Self]) -> BTreeMap<String, Vec<Self>> {
        let mut grouped: BTreeMap<String, Vec<Self>> = BTreeMap::new();
        for region in regions {
            let key = region
                .region_type
                .clone()
                .unwrap_or_else(|| "other".to_string());
            grouped.entry(key).or_default().push(region.clone());
        }
        grouped
    }
}

/// An image stored in the document repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Repository path of the raw image file.
    pub repo_location: String,
    /// MIME type of the image.
    pub content_type: String,
    /// Source of the image.
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// A literature reference mentioning the taxon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    /// Citation text.
    pub citation: String,
    /// Name string used in the reference, if different.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    /// Source of the reference.
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// A publication describing the taxon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    /// Citation text.
    pub citation: String,
    /// Year of publication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Source of the publication record.
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// Higher classification of a taxon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Classification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kingdom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phylum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "clazz")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// A free-text property harvested from a document, keyed by predicate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleProperty {
    /// Predicate (full URI or bare fragment).
    pub name: String,
    /// Property value.
    pub value: String,
    /// Source of the value.
    #[serde(flatten)]
    pub provenance: Provenance,
}

impl SimpleProperty {
    /// Returns true when the property name denotes narrative text
    /// (`...Text`, e.g. `hasDescriptiveText`), which is full-text indexed.
    #[must_use]
    pub fn is_narrative_text(&self) -> bool {
        self.name.ends_with("Text")
    }
}
