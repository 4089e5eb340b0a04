//! Search index schema.

use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED,
    STRING, TEXT,
};
use tantivy::tokenizer::{LowerCaser, RawTokenizer, TextAnalyzer};
use tantivy::{Index, TantivyDocument};

use crate::error::IndexError;
use crate::index::document::{DocType, TaxonDocument};

/// Whole-value, case-folded tokenizer used for exact-name and status terms.
pub const KEYWORD_LOWER: &str = "keyword_lower";

/// Field names.
pub mod field {
    /// Concept GUID (the accepted concept's on synonym documents).
    pub const GUID: &str = "guid";
    /// `taxonConcept` or `synonym`.
    pub const DOC_TYPE: &str = "docType";
    /// Every name form, matched case-insensitively as whole values.
    pub const SCIENTIFIC_NAME: &str = "scientificName";
    /// Name as stored.
    pub const SCIENTIFIC_NAME_RAW: &str = "scientificNameRaw";
    /// Accepted name on synonym documents.
    pub const ACCEPTED_CONCEPT_NAME: &str = "acceptedConceptName";
    /// Parent GUID.
    pub const PARENT_GUID: &str = "parentGuid";
    /// Normalised rank name.
    pub const RANK: &str = "rank";
    /// Numeric rank for sorting.
    pub const RANK_ID: &str = "rankId";
    /// Matched conservation status terms.
    pub const CONSERVATION_STATUS: &str = "conservationStatus";
    /// Matched pest status terms.
    pub const PEST_STATUS: &str = "pestStatus";
    /// Narrative text properties.
    pub const SIMPLE_TEXT: &str = "simpleText";
    /// Common names, analyzed.
    pub const COMMON_NAME: &str = "commonName";
    /// Common names joined without whitespace, for sorting.
    pub const COMMON_NAME_SORT: &str = "commonNameSort";
    /// Common names joined for display.
    pub const COMMON_NAME_DISPLAY: &str = "commonNameDisplay";
    /// Whether the concept has children.
    pub const HAS_CHILDREN: &str = "hasChildren";
    /// Info source ids the document was built from.
    pub const DATASET: &str = "dataset";
}

/// Resolved field handles.
#[derive(Debug, Clone, Copy)]
#[allow(missing_docs)]
pub struct TaxonFields {
    pub guid: Field,
    pub doc_type: Field,
    pub scientific_name: Field,
    pub scientific_name_raw: Field,
    pub accepted_concept_name: Field,
    pub parent_guid: Field,
    pub rank: Field,
    pub rank_id: Field,
    pub conservation_status: Field,
    pub pest_status: Field,
    pub simple_text: Field,
    pub common_name: Field,
    pub common_name_sort: Field,
    pub common_name_display: Field,
    pub has_children: Field,
    pub dataset: Field,
}

fn keyword_lower() -> TextOptions {
    TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(KEYWORD_LOWER)
                .set_index_option(IndexRecordOption::Basic),
        )
        .set_stored()
}

/// Builds the schema. GUID, raw name, common-name sort key and rank id are
/// fast fields so pages can be ordered without loading stored documents.
#[must_use]
pub fn build_schema() -> Schema {
    let mut b = Schema::builder();
    b.add_text_field(field::GUID, STRING | STORED | FAST);
    b.add_text_field(field::DOC_TYPE, STRING | STORED);
    b.add_text_field(field::SCIENTIFIC_NAME, keyword_lower());
    b.add_text_field(field::SCIENTIFIC_NAME_RAW, STRING | STORED | FAST);
    b.add_text_field(field::ACCEPTED_CONCEPT_NAME, STRING | STORED);
    b.add_text_field(field::PARENT_GUID, STRING | STORED);
    b.add_text_field(field::RANK, STRING | STORED);
    b.add_u64_field(field::RANK_ID, INDEXED | STORED | FAST);
    b.add_text_field(field::CONSERVATION_STATUS, keyword_lower());
    b.add_text_field(field::PEST_STATUS, keyword_lower());
    b.add_text_field(field::SIMPLE_TEXT, TEXT);
    b.add_text_field(field::COMMON_NAME, TEXT | STORED);
    b.add_text_field(field::COMMON_NAME_SORT, STRING | STORED | FAST);
    b.add_text_field(field::COMMON_NAME_DISPLAY, STORED);
    b.add_bool_field(field::HAS_CHILDREN, INDEXED | STORED);
    b.add_text_field(field::DATASET, STRING | STORED);
    b.build()
}

/// Registers the custom tokenizers on an index. Required after both
/// creating and opening an index.
pub fn register_tokenizers(index: &Index) {
    index.tokenizers().register(
        KEYWORD_LOWER,
        TextAnalyzer::builder(RawTokenizer::default())
            .filter(LowerCaser)
            .build(),
    );
}

impl TaxonFields {
    /// Looks up every field by name.
    ///
    /// # Errors
    /// `IndexError::Engine` if the schema lacks a field (an index written by
    /// an incompatible version).
    pub fn from_schema(schema: &Schema) -> Result<Self, IndexError> {
        Ok(Self {
            guid: schema.get_field(field::GUID)?,
            doc_type: schema.get_field(field::DOC_TYPE)?,
            scientific_name: schema.get_field(field::SCIENTIFIC_NAME)?,
            scientific_name_raw: schema.get_field(field::SCIENTIFIC_NAME_RAW)?,
            accepted_concept_name: schema.get_field(field::ACCEPTED_CONCEPT_NAME)?,
            parent_guid: schema.get_field(field::PARENT_GUID)?,
            rank: schema.get_field(field::RANK)?,
            rank_id: schema.get_field(field::RANK_ID)?,
            conservation_status: schema.get_field(field::CONSERVATION_STATUS)?,
            pest_status: schema.get_field(field::PEST_STATUS)?,
            simple_text: schema.get_field(field::SIMPLE_TEXT)?,
            common_name: schema.get_field(field::COMMON_NAME)?,
            common_name_sort: schema.get_field(field::COMMON_NAME_SORT)?,
            common_name_display: schema.get_field(field::COMMON_NAME_DISPLAY)?,
            has_children: schema.get_field(field::HAS_CHILDREN)?,
            dataset: schema.get_field(field::DATASET)?,
        })
    }

    /// Converts a document into its indexed form.
    #[must_use]
    pub fn to_tantivy(&self, doc: &TaxonDocument) -> TantivyDocument {
        let mut out = TantivyDocument::default();
        out.add_text(self.guid, &doc.guid);
        out.add_text(self.doc_type, doc.doc_type.as_str());
        for form in &doc.name_forms {
            out.add_text(self.scientific_name, form);
        }
        out.add_text(self.scientific_name_raw, &doc.scientific_name_raw);
        if let Some(accepted) = &doc.accepted_concept_name {
            out.add_text(self.accepted_concept_name, accepted);
        }
        if let Some(parent) = &doc.parent_guid {
            out.add_text(self.parent_guid, parent);
        }
        out.add_text(self.rank, doc.rank.name());
        out.add_u64(self.rank_id, doc.rank.id());
        for term in &doc.conservation_statuses {
            out.add_text(self.conservation_status, term);
        }
        for term in &doc.pest_statuses {
            out.add_text(self.pest_status, term);
        }
        for text in &doc.simple_text {
            out.add_text(self.simple_text, text);
        }
        if doc.doc_type == DocType::Concept {
            for name in &doc.common_names {
                out.add_text(self.common_name, name);
            }
        }
        if let Some(sort) = doc.common_name_sort() {
            out.add_text(self.common_name_sort, sort);
        }
        if let Some(display) = doc.common_name_display() {
            out.add_text(self.common_name_display, display);
        }
        out.add_bool(self.has_children, doc.has_children);
        for id in &doc.datasets {
            out.add_text(self.dataset, id);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use tantivy::tokenizer::TokenStream;

    use super::*;

    #[test]
    fn test_fields_resolve_from_built_schema() {
        let schema = build_schema();
        let fields = TaxonFields::from_schema(&schema).unwrap();
        assert_eq!(schema.get_field_name(fields.rank_id), field::RANK_ID);
        assert_eq!(schema.get_field_name(fields.dataset), field::DATASET);
    }

    #[test]
    fn test_keyword_lower_folds_case_only() {
        let index = Index::create_in_ram(build_schema());
        register_tokenizers(&index);
        let mut analyzer = index.tokenizers().get(KEYWORD_LOWER).unwrap();
        let mut stream = analyzer.token_stream("Canis Lupus");
        let mut tokens = Vec::new();
        while let Some(token) = stream.next() {
            tokens.push(token.text.clone());
        }
        assert_eq!(tokens, vec!["canis lupus"]);
    }
}
