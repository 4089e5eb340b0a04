//! Taxon concepts and their names.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::facts::{
    Classification, CommonName, ConservationStatus, ExtantStatus, Habitat, Image, PestStatus,
    Reference, Region, SimpleProperty,
};
use crate::guid::Guid;

/// A taxon concept: one name as used by one authority, keyed by GUID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonConcept {
    /// Identity. Immutable once assigned.
    pub guid: Guid,
    /// Scientific name string.
    pub name_string: Option<String>,
    /// Author of the name.
    pub author: Option<String>,
    /// Author and year.
    pub author_year: Option<String>,
    /// Rank as supplied by the source (e.g. "species").
    pub rank_string: Option<String>,
    /// Where the name was published.
    pub published_in: Option<String>,
    /// Full publication citation.
    pub published_in_citation: Option<String>,
    /// Accepted concept, set only when this concept is a synonym.
    pub accepted_concept_guid: Option<String>,
    /// Parent concept.
    pub parent_guid: Option<String>,
    /// Info source of the primary record.
    pub info_source_id: Option<String>,
    /// Info source display name.
    pub info_source_name: Option<String>,
    /// Info source URL.
    #[serde(rename = "infoSourceURL")]
    pub info_source_url: Option<String>,
}

impl TaxonConcept {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> TaxonConceptBuilder {
        TaxonConceptBuilder::default()
    }

    /// Reference to this concept for relation lists.
    #[must_use]
    pub fn to_ref(&self) -> ConceptRef {
        ConceptRef {
            guid: self.guid.clone(),
            name_string: self.name_string.clone(),
            rank_string: self.rank_string.clone(),
            info_source_id: self.info_source_id.clone(),
        }
    }
}

/// Builder for [`TaxonConcept`].
#[derive(Debug, Default)]
pub struct TaxonConceptBuilder {
    guid: Option<String>,
    name_string: Option<String>,
    author: Option<String>,
    author_year: Option<String>,
    rank_string: Option<String>,
    published_in: Option<String>,
    published_in_citation: Option<String>,
    accepted_concept_guid: Option<String>,
    parent_guid: Option<String>,
    info_source_id: Option<String>,
    info_source_name: Option<String>,
    info_source_url: Option<String>,
}

macro_rules! builder_setters {
    ($($(#[$doc:meta])* $field:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[must_use]
            pub fn $field(mut self, value: impl Into<String>) -> Self {
                self.$field = Some(value.into());
                self
            }
        )*
    };
}

impl TaxonConceptBuilder {
    builder_setters! {
        /// Sets the GUID (required).
        guid,
        /// Sets the scientific name.
        name_string,
        /// Sets the author.
        author,
        /// Sets author and year.
        author_year,
        /// Sets the rank string.
        rank_string,
        /// Sets the publication.
        published_in,
        /// Sets the publication citation.
        published_in_citation,
        /// Sets the accepted concept GUID.
        accepted_concept_guid,
        /// Sets the parent GUID.
        parent_guid,
        /// Sets the info source id.
        info_source_id,
        /// Sets the info source name.
        info_source_name,
        /// Sets the info source URL.
        info_source_url,
    }

    /// Builds the concept.
    ///
    /// # Errors
    /// `ValidationError::InvalidGuid` if the GUID is missing or blank.
    pub fn build(self) -> Result<TaxonConcept, ValidationError> {
        Ok(TaxonConcept {
            guid: Guid::parse_opt(self.guid.as_deref())?,
            name_string: self.name_string,
            author: self.author,
            author_year: self.author_year,
            rank_string: self.rank_string,
            published_in: self.published_in,
            published_in_citation: self.published_in_citation,
            accepted_concept_guid: self.accepted_concept_guid,
            parent_guid: self.parent_guid,
            info_source_id: self.info_source_id,
            info_source_name: self.info_source_name,
            info_source_url: self.info_source_url,
        })
    }
}

/// Weak reference to another concept, as stored in relation lists.
///
/// The name and source are denormalized so that index rebuilds can build
/// synonym documents without a second store read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptRef {
    /// Referenced concept.
    pub guid: Guid,
    /// Its scientific name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_string: Option<String>,
    /// Its rank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_string: Option<String>,
    /// Source that asserted it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_source_id: Option<String>,
}

impl ConceptRef {
    /// Reference carrying only a GUID and name.
    #[must_use]
    pub fn new(guid: Guid, name_string: Option<String>) -> Self {
        Self {
            guid,
            name_string,
            rank_string: None,
            info_source_id: None,
        }
    }
}

impl From<&TaxonConcept> for ConceptRef {
    fn from(tc: &TaxonConcept) -> Self {
        tc.to_ref()
    }
}

/// Nomenclatural detail, stored 1:1 with a concept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct TaxonName {
    pub guid: Option<String>,
    pub name_complete: Option<String>,
    pub authorship: Option<String>,
    pub nomenclatural_code: Option<String>,
    pub typification_string: Option<String>,
    pub published_in_citation: Option<String>,
    pub published_in: Option<String>,
    pub rank_string: Option<String>,
}

/// Everything known about a concept, assembled for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ExtendedTaxonConcept {
    pub taxon_concept: TaxonConcept,
    pub taxon_name: Option<TaxonName>,
    pub classification: Option<Classification>,
    pub synonyms: Vec<ConceptRef>,
    pub common_names: Vec<CommonName>,
    pub child_concepts: Vec<ConceptRef>,
    pub parent_concepts: Vec<ConceptRef>,
    pub pest_statuses: Vec<PestStatus>,
    pub conservation_statuses: Vec<ConservationStatus>,
    pub images: Vec<Image>,
    pub extant_statuses: Vec<ExtantStatus>,
    pub habitats: Vec<Habitat>,
    pub region_types: BTreeMap<String, Vec<Region>>,
    pub references: Vec<Reference>,
    /// Sorted by name, then value.
    pub simple_properties: Vec<SimpleProperty>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_guid() {
        let err = TaxonConcept::builder().name_string("Canis lupus").build();
        assert!(matches!(err, Err(ValidationError::InvalidGuid)));

        let err = TaxonConcept::builder().guid("  ").build();
        assert!(matches!(err, Err(ValidationError::InvalidGuid)));
    }

    #[test]
    fn test_builder_and_ref() {
        let tc = TaxonConcept::builder()
            .guid("urn:lsid:afd:1")
            .name_string("Canis lupus")
            .rank_string("species")
            .info_source_id("1")
            .build()
            .unwrap();
        let r = tc.to_ref();
        assert_eq!(r.guid.as_str(), "urn:lsid:afd:1");
        assert_eq!(r.name_string.as_deref(), Some("Canis lupus"));
        assert_eq!(r.rank_string.as_deref(), Some("species"));
    }

    #[test]
    fn test_concept_ref_json_shape() {
        let r = ConceptRef::new(Guid::parse("urn:1").unwrap(), Some("Vulpes".into()));
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"guid":"urn:1","nameString":"Vulpes"}"#);
    }
}
