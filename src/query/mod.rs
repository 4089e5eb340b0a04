//! Query engine over the live index generation.
//!
//! Queries are built programmatically rather than parsed, so the only syntax
//! callers can get wrong is quoting and escaping. Every operation picks up one
//! generation at the start and uses it to the end, so a concurrent swap never
//! mixes results from two generations.

mod page;

pub use page::{
    PageRequest, SearchResults, SearchStatus, SearchTaxonConcept, SortDirection, SortField,
};

use std::cmp::Ordering;
use std::sync::Arc;

use tantivy::collector::{Count, TopDocs};
use tantivy::columnar::{Column, StrColumn};
use tantivy::query::{BooleanQuery, BoostQuery, Occur, PhraseQuery, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{DocAddress, DocId, Score, Searcher, SegmentReader, TantivyDocument, Term};
use tracing::{debug, warn};

use crate::config::BoostConfig;
use crate::error::QueryError;
use crate::guid::Guid;
use crate::index::names::expand_abbreviation;
use crate::index::schema::{self, TaxonFields};
use crate::index::{DocType, IndexGeneration, IndexHandle};
use crate::vocabulary::{StatusType, Vocabulary};

/// Read-only query operations.
pub struct QueryEngine {
    index: Arc<IndexHandle>,
    vocabulary: Arc<dyn Vocabulary>,
    boosts: BoostConfig,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("boosts", &self.boosts)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Number(Option<u64>),
    Text(Option<String>),
}

/// Position of one hit in a field-sorted page. Greater sorts earlier, so
/// the best `start + page_size` hits are what `TopDocs` keeps.
#[derive(Debug, Clone)]
struct FieldRank {
    key: SortKey,
    guid: String,
    descending: bool,
    score: Score,
}

impl FieldRank {
    fn order(&self, other: &Self) -> Ordering {
        let key = self.key.cmp(&other.key);
        let key = if self.descending { key } else { key.reverse() };
        key.then_with(|| other.guid.cmp(&self.guid))
    }
}

impl PartialEq for FieldRank {
    fn eq(&self, other: &Self) -> bool {
        self.order(other) == Ordering::Equal
    }
}

impl PartialOrd for FieldRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.order(other))
    }
}

/// Fast-field columns of one segment needed to rank hits by `field`.
struct SegmentKeys {
    field: SortField,
    descending: bool,
    guid: Option<StrColumn>,
    text: Option<StrColumn>,
    number: Option<Column<u64>>,
}

impl SegmentKeys {
    fn open(reader: &SegmentReader, field: SortField, descending: bool) -> Self {
        let text = match field {
            SortField::ScientificName => str_column(reader, schema::field::SCIENTIFIC_NAME_RAW),
            SortField::CommonName => str_column(reader, schema::field::COMMON_NAME_SORT),
            _ => None,
        };
        let number = if field == SortField::Rank {
            match reader.fast_fields().u64(schema::field::RANK_ID) {
                Ok(column) => Some(column),
                Err(e) => {
                    warn!(error = %e, "rank column unavailable, sorting as missing");
                    None
                }
            }
        } else {
            None
        };
        Self {
            field,
            descending,
            guid: str_column(reader, schema::field::GUID),
            text,
            number,
        }
    }

    fn rank(&self, doc: DocId, score: Score) -> FieldRank {
        let guid = first_text(self.guid.as_ref(), doc).unwrap_or_default();
        let key = match self.field {
            SortField::Rank => SortKey::Number(self.number.as_ref().and_then(|c| c.first(doc))),
            SortField::ScientificName => {
                SortKey::Text(first_text(self.text.as_ref(), doc).map(|n| n.to_lowercase()))
            }
            SortField::CommonName => SortKey::Text(first_text(self.text.as_ref(), doc)),
            SortField::Guid => SortKey::Text(Some(guid.clone())),
            SortField::Score => SortKey::Number(None),
        };
        FieldRank {
            key,
            guid,
            descending: self.descending,
            score,
        }
    }
}

/// A missing column (no document in the segment has a value) is `None`.
fn str_column(reader: &SegmentReader, name: &str) -> Option<StrColumn> {
    match reader.fast_fields().str(name) {
        Ok(column) => column,
        Err(e) => {
            warn!(field = name, error = %e, "sort column unavailable, sorting as missing");
            None
        }
    }
}

fn first_text(column: Option<&StrColumn>, doc: DocId) -> Option<String> {
    let column = column?;
    let ord = column.term_ords(doc).next()?;
    let mut out = String::new();
    match column.ord_to_str(ord, &mut out) {
        Ok(true) => Some(out),
        _ => None,
    }
}

impl QueryEngine {
    /// Creates a query engine over `index`.
    #[must_use]
    pub fn new(index: Arc<IndexHandle>, vocabulary: Arc<dyn Vocabulary>, boosts: BoostConfig) -> Self {
        Self {
            index,
            vocabulary,
            boosts,
        }
    }

    fn ready(&self, operation: &'static str) -> Option<Arc<IndexGeneration>> {
        let generation = self.index.current();
        if generation.is_none() {
            warn!(operation, "index not ready, returning no results");
        }
        generation
    }

    /// Exact-name, common-name and GUID search.
    ///
    /// Blank or missing input yields an empty page.
    ///
    /// # Errors
    /// `QueryError::Syntax` for an unbalanced quote or a dangling escape;
    /// `QueryError::Index` if the index cannot be read.
    pub fn search_by_name(
        &self,
        input: Option<&str>,
        page: &PageRequest,
    ) -> Result<SearchResults, QueryError> {
        let raw = input.unwrap_or("");
        let text = parse_input(raw)?;
        if text.is_empty() {
            return Ok(SearchResults::empty(raw, page));
        }
        let Some(generation) = self.ready("search_by_name") else {
            return Ok(SearchResults::not_ready(raw, page));
        };
        let query = BooleanQuery::new(self.name_clauses(&generation, &text)?);
        run(&generation, &query, raw, page)
    }

    /// Every concept carrying any vocabulary term of `status`.
    ///
    /// # Errors
    /// `QueryError::Index` if the index cannot be read.
    pub fn find_all_by_status(
        &self,
        status: StatusType,
        page: &PageRequest,
    ) -> Result<SearchResults, QueryError> {
        let label = status.field_name();
        let terms = self.vocabulary.terms_for_status(status);
        if terms.is_empty() {
            debug!(status = label, "no vocabulary terms for status");
            return Ok(SearchResults::empty(label, page));
        }
        let Some(generation) = self.ready("find_all_by_status") else {
            return Ok(SearchResults::not_ready(label, page));
        };
        let fields = generation.fields();
        let field = match status {
            StatusType::Conservation => fields.conservation_status,
            StatusType::Pest => fields.pest_status,
        };
        let clauses = terms
            .iter()
            .map(|t| {
                let term = Term::from_field_text(field, &t.trim().to_lowercase());
                (
                    Occur::Should,
                    boosted(Box::new(TermQuery::new(term, IndexRecordOption::Basic)), self.boosts.status),
                )
            })
            .collect();
        run(&generation, &BooleanQuery::new(clauses), label, page)
    }

    /// Direct children of `parent_guid`, at most `limit`.
    ///
    /// # Errors
    /// `QueryError::Index` if the index cannot be read.
    pub fn find_by_parent(
        &self,
        parent_guid: &str,
        limit: usize,
    ) -> Result<Vec<SearchTaxonConcept>, QueryError> {
        let parent_guid = parent_guid.trim();
        if parent_guid.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let Some(generation) = self.ready("find_by_parent") else {
            return Ok(Vec::new());
        };
        let fields = generation.fields();
        let query = primary_only(
            fields,
            Box::new(TermQuery::new(
                Term::from_field_text(fields.parent_guid, parent_guid),
                IndexRecordOption::Basic,
            )),
        );
        Ok(run(&generation, query.as_ref(), parent_guid, &PageRequest::new(0, limit))?.items)
    }

    /// Best-effort lookup of a single concept id by scientific name.
    ///
    /// An abbreviated binomial (`"C. lupus"`) is expanded with `genus` first.
    /// Synonym names resolve to their accepted concept.
    ///
    /// # Errors
    /// `QueryError::Index` if the index cannot be read.
    pub fn find_concept_id_for_name(
        &self,
        kingdom: Option<&str>,
        genus: Option<&str>,
        scientific_name: &str,
    ) -> Result<Option<Guid>, QueryError> {
        let name = expand_abbreviation(scientific_name, genus)
            .unwrap_or_else(|| scientific_name.trim().to_string());
        let normalized = normalize_name(&name);
        if normalized.is_empty() {
            return Ok(None);
        }
        debug!(kingdom = kingdom.unwrap_or(""), name = %name, "looking up concept id");
        let Some(generation) = self.ready("find_concept_id_for_name") else {
            return Ok(None);
        };
        let query = TermQuery::new(
            Term::from_field_text(generation.fields().scientific_name, &normalized),
            IndexRecordOption::Basic,
        );
        let page = run(&generation, &query, &name, &PageRequest::new(0, 1))?;
        Ok(page
            .items
            .into_iter()
            .next()
            .and_then(|hit| Guid::parse(&hit.guid).ok()))
    }

    /// Name search plus full-text search over narrative text properties.
    ///
    /// # Errors
    /// As [`search_by_name`](Self::search_by_name).
    pub fn search_text(
        &self,
        input: Option<&str>,
        page: &PageRequest,
    ) -> Result<SearchResults, QueryError> {
        let raw = input.unwrap_or("");
        let text = parse_input(raw)?;
        if text.is_empty() {
            return Ok(SearchResults::empty(raw, page));
        }
        let Some(generation) = self.ready("search_text") else {
            return Ok(SearchResults::not_ready(raw, page));
        };
        let mut clauses = self.name_clauses(&generation, &text)?;
        let words: Vec<Box<dyn Query>> = tokens(&generation, generation.fields().simple_text, &text)?
            .into_iter()
            .map(|t| Box::new(TermQuery::new(t, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
            .collect();
        if !words.is_empty() {
            let any_word = BooleanQuery::union(words);
            clauses.push((Occur::Should, boosted(Box::new(any_word), self.boosts.text)));
        }
        run(&generation, &BooleanQuery::new(clauses), raw, page)
    }

    /// First `limit` hits of [`search_by_name`](Self::search_by_name).
    ///
    /// # Errors
    /// As [`search_by_name`](Self::search_by_name).
    pub fn find_by_scientific_name(
        &self,
        input: &str,
        limit: usize,
    ) -> Result<Vec<SearchTaxonConcept>, QueryError> {
        Ok(self
            .search_by_name(Some(input), &PageRequest::new(0, limit))?
            .items)
    }

    /// OR of exact scientific name, common-name phrase and GUID.
    fn name_clauses(
        &self,
        generation: &IndexGeneration,
        text: &str,
    ) -> Result<Vec<(Occur, Box<dyn Query>)>, QueryError> {
        let fields = generation.fields();
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        let name = TermQuery::new(
            Term::from_field_text(fields.scientific_name, &normalize_name(text)),
            IndexRecordOption::Basic,
        );
        clauses.push((Occur::Should, boosted(Box::new(name), self.boosts.name)));

        let mut words = tokens(generation, fields.common_name, text)?;
        let common: Option<Box<dyn Query>> = match words.len() {
            0 => None,
            1 => words
                .pop()
                .map(|t| Box::new(TermQuery::new(t, IndexRecordOption::WithFreqs)) as Box<dyn Query>),
            _ => Some(Box::new(PhraseQuery::new(words))),
        };
        if let Some(common) = common {
            clauses.push((
                Occur::Should,
                boosted(primary_only(fields, common), self.boosts.common_name),
            ));
        }

        let trimmed = text.trim();
        let mut guids = vec![trimmed.to_string()];
        let lowered = trimmed.to_lowercase();
        if lowered != trimmed {
            guids.push(lowered);
        }
        for guid in guids {
            let term = TermQuery::new(
                Term::from_field_text(fields.guid, &guid),
                IndexRecordOption::Basic,
            );
            clauses.push((Occur::Should, primary_only(fields, Box::new(term))));
        }
        Ok(clauses)
    }
}

/// Validates quoting and escaping, then strips both.
fn parse_input(raw: &str) -> Result<String, QueryError> {
    let syntax = |reason: &str| QueryError::Syntax {
        input: raw.to_string(),
        reason: reason.to_string(),
    };
    let mut out = String::with_capacity(raw.len());
    let mut quotes = 0usize;
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => out.push(escaped),
                None => return Err(syntax("dangling escape character")),
            },
            '"' => quotes += 1,
            _ => out.push(c),
        }
    }
    if quotes % 2 != 0 {
        return Err(syntax("unbalanced quotation mark"));
    }
    Ok(out.trim().to_string())
}

/// Whitespace-collapsed, lowercased form matching the keyword tokenizer.
fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn boosted(query: Box<dyn Query>, boost: f32) -> Box<dyn Query> {
    if (boost - 1.0).abs() < f32::EPSILON {
        query
    } else {
        Box::new(BoostQuery::new(query, boost))
    }
}

/// Restricts `query` to primary (non-synonym) documents.
fn primary_only(fields: &TaxonFields, query: Box<dyn Query>) -> Box<dyn Query> {
    let primary = TermQuery::new(
        Term::from_field_text(fields.doc_type, DocType::Concept.as_str()),
        IndexRecordOption::Basic,
    );
    Box::new(BooleanQuery::new(vec![
        (Occur::Must, query),
        (Occur::Must, Box::new(primary)),
    ]))
}

/// Terms produced by the field's own analyzer.
fn tokens(generation: &IndexGeneration, field: Field, text: &str) -> Result<Vec<Term>, QueryError> {
    let mut analyzer = generation.index().tokenizer_for_field(field)?;
    let mut stream = analyzer.token_stream(text);
    let mut terms = Vec::new();
    while stream.advance() {
        terms.push(Term::from_field_text(field, &stream.token().text));
    }
    Ok(terms)
}

fn first_str(doc: &TantivyDocument, field: Field) -> Option<String> {
    doc.get_first(field).and_then(|v| v.as_str()).map(str::to_string)
}

fn load_hit(
    searcher: &Searcher,
    fields: &TaxonFields,
    score: f32,
    address: DocAddress,
) -> Result<SearchTaxonConcept, QueryError> {
    let doc: TantivyDocument = searcher.doc(address)?;
    Ok(SearchTaxonConcept {
        guid: first_str(&doc, fields.guid).unwrap_or_default(),
        parent_guid: first_str(&doc, fields.parent_guid),
        name_string: first_str(&doc, fields.scientific_name_raw),
        accepted_concept_name: first_str(&doc, fields.accepted_concept_name),
        common_name: first_str(&doc, fields.common_name_display),
        has_children: doc
            .get_first(fields.has_children)
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        score,
        rank: first_str(&doc, fields.rank),
        rank_id: doc.get_first(fields.rank_id).and_then(|v| v.as_u64()),
        pest_status: first_str(&doc, fields.pest_status),
        conservation_status: first_str(&doc, fields.conservation_status),
    })
}

/// Executes `query` and returns the requested page.
///
/// Both orderings keep only the best `start + page_size` hits, capped at the
/// match count; a page starting past the last match is empty without
/// collecting. Field ordering ranks hits from fast-field columns. Ties always
/// break on GUID so every order is total.
fn run(
    generation: &IndexGeneration,
    query: &dyn Query,
    echo: &str,
    page: &PageRequest,
) -> Result<SearchResults, QueryError> {
    let searcher = generation.searcher();
    let fields = generation.fields();
    let total = searcher.search(query, &Count)?;
    if page.page_size == 0 || page.start >= total {
        return Ok(SearchResults::new(Vec::new(), total, echo, page));
    }
    // start < total, so 1 <= limit <= total
    let limit = page.start.saturating_add(page.page_size).min(total);

    let hits = match page.sort_field {
        SortField::Score => {
            let mut hits = searcher
                .search(query, &TopDocs::with_limit(limit))?
                .into_iter()
                .map(|(score, address)| load_hit(&searcher, fields, score, address))
                .collect::<Result<Vec<_>, _>>()?;
            hits.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then_with(|| a.guid.cmp(&b.guid))
            });
            hits
        }
        field => {
            let descending = page.sort_direction == SortDirection::Desc;
            let ranked = TopDocs::with_limit(limit).tweak_score(move |reader: &SegmentReader| {
                let keys = SegmentKeys::open(reader, field, descending);
                move |doc: DocId, score: Score| keys.rank(doc, score)
            });
            searcher
                .search(query, &ranked)?
                .into_iter()
                .map(|(rank, address)| load_hit(&searcher, fields, rank.score, address))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let items = hits
        .into_iter()
        .skip(page.start)
        .take(page.page_size)
        .collect();
    Ok(SearchResults::new(items, total, echo, page))
}
