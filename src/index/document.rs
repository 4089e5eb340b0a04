//! Flattening concept rows into search documents.
//!
//! Everything here is pure: the same row and vocabulary always produce the
//! same documents, which is what makes rebuilds reproducible.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::warn;

use crate::concept::{ConceptRef, TaxonConcept};
use crate::facts::{CommonName, SimpleProperty, StatusFact};
use crate::guid::Guid;
use crate::index::names::name_forms;
use crate::rank::Rank;
use crate::repository::{decode_concept, decode_list, lists};
use crate::storage::{ConceptRow, StorageError};
use crate::vocabulary::{StatusType, Vocabulary};

/// Kind of search document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DocType {
    /// The concept itself.
    Concept,
    /// A synonym or congruent name pointing at its accepted concept.
    Synonym,
}

impl DocType {
    /// Indexed value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Concept => "taxonConcept",
            Self::Synonym => "synonym",
        }
    }
}

/// One search document before conversion to the index format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxonDocument {
    /// GUID the document resolves to.
    pub guid: String,
    /// Primary or synonym.
    pub doc_type: DocType,
    /// Searchable name forms.
    pub name_forms: Vec<String>,
    /// Name as stored on the concept (or synonym).
    pub scientific_name_raw: String,
    /// Accepted name, on synonym documents.
    pub accepted_concept_name: Option<String>,
    /// Parent GUID.
    pub parent_guid: Option<String>,
    /// Normalised rank.
    pub rank: Rank,
    /// Matched conservation vocabulary terms.
    pub conservation_statuses: Vec<String>,
    /// Matched pest vocabulary terms.
    pub pest_statuses: Vec<String>,
    /// Narrative text values.
    pub simple_text: Vec<String>,
    /// Lowercased, sorted, distinct common names.
    pub common_names: Vec<String>,
    /// Whether the concept has children.
    pub has_children: bool,
    /// Distinct info source ids touched.
    pub datasets: Vec<String>,
}

impl TaxonDocument {
    /// Common names joined with whitespace removed, for sorting.
    #[must_use]
    pub fn common_name_sort(&self) -> Option<String> {
        if self.common_names.is_empty() {
            return None;
        }
        Some(
            self.common_names
                .concat()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect(),
        )
    }

    /// Common names joined for display.
    #[must_use]
    pub fn common_name_display(&self) -> Option<String> {
        (!self.common_names.is_empty()).then(|| self.common_names.join(", "))
    }
}

/// The parts of a concept row the index reads.
#[derive(Debug, Clone)]
pub struct ConceptRecord {
    /// Core fields.
    pub concept: TaxonConcept,
    /// Synonyms.
    pub synonyms: Vec<ConceptRef>,
    /// Congruent concepts (indexed like synonyms).
    pub congruent: Vec<ConceptRef>,
    /// Children.
    pub children: Vec<ConceptRef>,
    /// Common names.
    pub common_names: Vec<CommonName>,
    /// Conservation statuses.
    pub conservation_statuses: Vec<StatusFact>,
    /// Pest statuses.
    pub pest_statuses: Vec<StatusFact>,
    /// Free-text properties.
    pub text_properties: Vec<SimpleProperty>,
}

impl ConceptRecord {
    /// Decodes a core-family row.
    ///
    /// # Errors
    /// `StorageError::InvalidArgument` for a blank row key,
    /// `StorageError::Serialization` for a corrupt list cell.
    pub fn from_row(row: &ConceptRow) -> Result<Self, StorageError> {
        let guid = Guid::parse(&row.guid)?;
        Ok(Self {
            concept: decode_concept(guid, row),
            synonyms: decode_list(row, lists::SYNONYMS)?,
            congruent: decode_list(row, lists::IS_CONGRUENT_TO)?,
            children: decode_list(row, lists::CHILDREN)?,
            common_names: decode_list(row, lists::COMMON_NAMES)?,
            conservation_statuses: decode_list(row, lists::CONSERVATION_STATUSES)?,
            pest_statuses: decode_list(row, lists::PEST_STATUSES)?,
            text_properties: decode_list(row, lists::TEXT_PROPERTIES)?,
        })
    }
}

/// Documents produced for one concept.
#[derive(Debug, Clone, Default)]
pub struct ConceptDocuments {
    /// The primary document; `None` when the concept has no name yet.
    pub primary: Option<TaxonDocument>,
    /// One document per named synonym or congruent concept.
    pub synonyms: Vec<TaxonDocument>,
}

/// Normalises a stored rank string, falling back to [`Rank::DEFAULT`].
pub(crate) fn normalize_rank(guid: &Guid, rank_string: Option<&str>) -> Rank {
    match rank_string.and_then(Rank::from_name) {
        Some(rank) => rank,
        None => {
            warn!(
                guid = %guid,
                rank = rank_string.unwrap_or(""),
                fallback = Rank::DEFAULT.name(),
                "unknown rank, indexing under default"
            );
            Rank::DEFAULT
        }
    }
}

/// Vocabulary terms contained (case-insensitively) in any stored status.
/// Terms come back trimmed, the form status queries look up.
fn matched_terms(
    terms: &[String],
    statuses: &[StatusFact],
    datasets: &mut BTreeSet<String>,
) -> Vec<String> {
    let mut matched = Vec::new();
    for term in terms {
        let term = term.trim();
        if term.is_empty() {
            continue;
        }
        let needle = term.to_lowercase();
        for status in statuses {
            let hit = std::iter::once(&status.status)
                .chain(status.raw_status.as_ref())
                .any(|value| value.to_lowercase().contains(&needle));
            if hit {
                if !matched.iter().any(|m| m == term) {
                    matched.push(term.to_string());
                }
                if let Some(id) = &status.provenance.info_source_id {
                    datasets.insert(id.clone());
                }
            }
        }
    }
    matched
}

/// Builds the primary and synonym documents for one concept.
///
/// Concepts without a scientific name yield no documents at all.
#[must_use]
pub fn build_documents(record: &ConceptRecord, vocabulary: &dyn Vocabulary) -> ConceptDocuments {
    let tc = &record.concept;
    let Some(name) = tc.name_string.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
        return ConceptDocuments::default();
    };
    let rank = normalize_rank(&tc.guid, tc.rank_string.as_deref());

    let mut datasets = BTreeSet::new();
    if let Some(id) = &tc.info_source_id {
        datasets.insert(id.clone());
    }

    let conservation_statuses = matched_terms(
        &vocabulary.terms_for_status(StatusType::Conservation),
        &record.conservation_statuses,
        &mut datasets,
    );
    let pest_statuses = matched_terms(
        &vocabulary.terms_for_status(StatusType::Pest),
        &record.pest_statuses,
        &mut datasets,
    );

    let simple_text: Vec<String> = record
        .text_properties
        .iter()
        .filter(|p| p.is_narrative_text())
        .map(|p| {
            if let Some(id) = &p.provenance.info_source_id {
                datasets.insert(id.clone());
            }
            p.value.clone()
        })
        .collect();

    let common_names: BTreeSet<String> = record
        .common_names
        .iter()
        .filter_map(|cn| {
            let lowered = cn.name_string.trim().to_lowercase();
            if lowered.is_empty() {
                return None;
            }
            if let Some(id) = &cn.provenance.info_source_id {
                datasets.insert(id.clone());
            }
            Some(lowered)
        })
        .collect();
    let common_names: Vec<String> = common_names.into_iter().collect();

    let primary = TaxonDocument {
        guid: tc.guid.to_string(),
        doc_type: DocType::Concept,
        name_forms: name_forms(name),
        scientific_name_raw: name.to_string(),
        accepted_concept_name: None,
        parent_guid: tc.parent_guid.clone(),
        rank,
        conservation_statuses,
        pest_statuses,
        simple_text,
        common_names: common_names.clone(),
        has_children: !record.children.is_empty(),
        datasets: datasets.into_iter().collect(),
    };

    let synonyms = record
        .synonyms
        .iter()
        .chain(&record.congruent)
        .filter_map(|syn| {
            let syn_name = syn
                .name_string
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())?;
            Some(TaxonDocument {
                guid: tc.guid.to_string(),
                doc_type: DocType::Synonym,
                name_forms: name_forms(syn_name),
                scientific_name_raw: syn_name.to_string(),
                accepted_concept_name: Some(name.to_string()),
                parent_guid: None,
                rank,
                conservation_statuses: Vec::new(),
                pest_statuses: Vec::new(),
                simple_text: Vec::new(),
                common_names: common_names.clone(),
                has_children: false,
                datasets: syn.info_source_id.iter().cloned().collect(),
            })
        })
        .collect();

    ConceptDocuments {
        primary: Some(primary),
        synonyms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::Provenance;
    use crate::vocabulary::InMemoryVocabulary;

    fn record(name: Option<&str>, rank: Option<&str>) -> ConceptRecord {
        let mut builder = TaxonConcept::builder().guid("urn:accepted").info_source_id("1");
        if let Some(n) = name {
            builder = builder.name_string(n);
        }
        if let Some(r) = rank {
            builder = builder.rank_string(r);
        }
        ConceptRecord {
            concept: builder.build().unwrap(),
            synonyms: Vec::new(),
            congruent: Vec::new(),
            children: Vec::new(),
            common_names: Vec::new(),
            conservation_statuses: Vec::new(),
            pest_statuses: Vec::new(),
            text_properties: Vec::new(),
        }
    }

    fn vocab() -> InMemoryVocabulary {
        InMemoryVocabulary::new()
            .with_terms(StatusType::Conservation, ["Endangered", "Vulnerable"])
            .with_terms(StatusType::Pest, ["Declared pest"])
    }

    #[test]
    fn test_unnamed_concepts_are_skipped() {
        let docs = build_documents(&record(None, Some("species")), &vocab());
        assert!(docs.primary.is_none());
        assert!(docs.synonyms.is_empty());
    }

    #[test]
    fn test_unknown_rank_falls_back() {
        let docs = build_documents(&record(Some("Canis"), Some("clade")), &vocab());
        assert_eq!(docs.primary.unwrap().rank, Rank::DEFAULT);
    }

    #[test]
    fn test_status_substring_match() {
        let mut rec = record(Some("Canis lupus"), Some("species"));
        rec.conservation_statuses
            .push(StatusFact::new("critically endangered", Provenance::from_source("77")));
        let doc = build_documents(&rec, &vocab()).primary.unwrap();
        assert_eq!(doc.conservation_statuses, vec!["Endangered"]);
        assert!(doc.pest_statuses.is_empty());
        assert_eq!(doc.datasets, vec!["1", "77"]);
    }

    #[test]
    fn test_padded_vocabulary_terms_are_trimmed() {
        let vocab = InMemoryVocabulary::new()
            .with_terms(StatusType::Conservation, [" Endangered ", "Endangered", "   "]);
        let mut rec = record(Some("Canis lupus"), Some("species"));
        rec.conservation_statuses
            .push(StatusFact::new("Endangered (NSW)", Provenance::default()));
        let doc = build_documents(&rec, &vocab).primary.unwrap();
        assert_eq!(doc.conservation_statuses, vec!["Endangered"]);
    }

    #[test]
    fn test_common_names_and_text() {
        let mut rec = record(Some("Canis lupus"), Some("species"));
        rec.common_names = vec![
            CommonName::new("Grey Wolf", Provenance::default()),
            CommonName::new("dingo", Provenance::default()),
            CommonName::new("grey wolf", Provenance::default()),
        ];
        rec.text_properties = vec![
            SimpleProperty {
                name: "hasDescriptiveText".into(),
                value: "Large canid".into(),
                provenance: Provenance::default(),
            },
            SimpleProperty {
                name: "hasGenus".into(),
                value: "Canis".into(),
                provenance: Provenance::default(),
            },
        ];
        let doc = build_documents(&rec, &vocab()).primary.unwrap();
        assert_eq!(doc.common_names, vec!["dingo", "grey wolf"]);
        assert_eq!(doc.common_name_sort().as_deref(), Some("dingogreywolf"));
        assert_eq!(doc.common_name_display().as_deref(), Some("dingo, grey wolf"));
        assert_eq!(doc.simple_text, vec!["Large canid"]);
    }

    #[test]
    fn test_synonym_documents_point_at_accepted_concept() {
        let mut rec = record(Some("Canis lupus"), Some("species"));
        rec.synonyms
            .push(ConceptRef::new(Guid::parse("urn:syn").unwrap(), Some("Canis lycaon".into())));
        rec.congruent
            .push(ConceptRef::new(Guid::parse("urn:cong").unwrap(), Some("Lupus lupus".into())));
        rec.synonyms.push(ConceptRef::new(Guid::parse("urn:unnamed").unwrap(), None));
        rec.children
            .push(ConceptRef::new(Guid::parse("urn:child").unwrap(), None));

        let docs = build_documents(&rec, &vocab());
        assert!(docs.primary.unwrap().has_children);
        assert_eq!(docs.synonyms.len(), 2);
        for syn in &docs.synonyms {
            assert_eq!(syn.guid, "urn:accepted");
            assert_eq!(syn.doc_type, DocType::Synonym);
            assert_eq!(syn.accepted_concept_name.as_deref(), Some("Canis lupus"));
            assert_eq!(syn.rank, Rank::Species);
        }
        assert_eq!(docs.synonyms[0].scientific_name_raw, "Canis lycaon");
    }
}
