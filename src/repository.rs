//! Typed access to concept rows.
//!
//! [`ConceptRepository`] maps concepts, names and fact lists onto the
//! column families of a [`ConceptStore`]. Scalar fields are stored as plain
//! text; every one-to-many fact is stored as a JSON list under a single
//! column and updated with a compare-and-swap loop, so concurrent appenders
//! to the same GUID never lose each other's items.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::concept::{ConceptRef, ExtendedTaxonConcept, TaxonConcept, TaxonName};
use crate::facts::{
    Classification, CommonName, ConservationStatus, ExtantStatus, Habitat, Image, PestStatus,
    Reference, Region, SimpleProperty,
};
use crate::guid::Guid;
use crate::storage::{ConceptRow, ConceptStore, Family, FamilyFilter, StorageError};

/// Core-family scalar columns.
pub(crate) mod columns {
    pub const ID: &str = "id";
    pub const PARENT_GUID: &str = "parentGuid";
    pub const NAME_STRING: &str = "nameString";
    pub const AUTHOR: &str = "author";
    pub const AUTHOR_YEAR: &str = "authorYear";
    pub const PUBLISHED_IN: &str = "publishedIn";
    pub const PUBLISHED_IN_CITATION: &str = "publishedInCitation";
    pub const ACCEPTED_CONCEPT_GUID: &str = "acceptedConceptGuid";
    pub const RANK_STRING: &str = "rankString";
    pub const INFO_SOURCE_ID: &str = "infoSourceId";
    pub const INFO_SOURCE_NAME: &str = "infoSourceName";
    pub const INFO_SOURCE_URL: &str = "infoSourceUrl";
}

/// Name-family columns.
mod name_columns {
    pub const GUID: &str = "guid";
    pub const NAME_COMPLETE: &str = "nameComplete";
    pub const AUTHORSHIP: &str = "authorship";
    pub const NOMENCLATURAL_CODE: &str = "nomenclaturalCode";
    pub const TYPIFICATION_STRING: &str = "typificationString";
    pub const PUBLISHED_IN_CITATION: &str = "publishedInCitation";
    pub const PUBLISHED_IN: &str = "publishedIn";
    pub const RANK_STRING: &str = "rankString";
}

/// A list-valued column holding items of type `T`.
pub struct ListColumn<T> {
    family: Family,
    name: &'static str,
    _item: PhantomData<fn() -> T>,
}

impl<T> ListColumn<T> {
    const fn core(name: &'static str) -> Self {
        Self {
            family: Family::Core,
            name,
            _item: PhantomData,
        }
    }

    /// Column family the list lives in.
    #[must_use]
    pub const fn family(&self) -> Family {
        self.family
    }

    /// Column name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ListColumn<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ListColumn<T> {}

impl<T> std::fmt::Debug for ListColumn<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ListColumn({}:{})", self.family, self.name)
    }
}

/// Every list column of a concept row.
pub mod lists {
    use super::ListColumn;
    use crate::concept::ConceptRef;
    use crate::facts::{
        Classification, CommonName, ConservationStatus, ExtantStatus, Habitat, Image, PestStatus,
        Publication, Reference, Region, SimpleProperty,
    };

    /// Alternative identifiers for the same concept.
    pub const SAME_AS: ListColumn<ConceptRef> = ListColumn::core("sameAs");
    /// Synonyms of this (accepted) concept.
    pub const SYNONYMS: ListColumn<ConceptRef> = ListColumn::core("hasSynonym");
    /// Accepted concepts this concept is a synonym for.
    pub const IS_SYNONYM_FOR: ListColumn<ConceptRef> = ListColumn::core("IsSynonymFor");
    /// Congruent concepts, indexed like synonyms.
    pub const IS_CONGRUENT_TO: ListColumn<ConceptRef> = ListColumn::core("IsCongruentTo");
    /// Parents of this concept.
    pub const PARENTS: ListColumn<ConceptRef> = ListColumn::core("IsChildTaxonOf");
    /// Children of this concept.
    pub const CHILDREN: ListColumn<ConceptRef> = ListColumn::core("IsParentTaxonOf");
    /// Vernacular names.
    pub const COMMON_NAMES: ListColumn<CommonName> = ListColumn::core("VernacularConcept");
    /// Conservation statuses.
    pub const CONSERVATION_STATUSES: ListColumn<ConservationStatus> =
        ListColumn::core("hasConservationStatus");
    /// Pest statuses.
    pub const PEST_STATUSES: ListColumn<PestStatus> = ListColumn::core("hasPestStatus");
    /// Regions of occurrence.
    pub const REGIONS: ListColumn<Region> = ListColumn::core("hasRegion");
    /// Extant statuses.
    pub const EXTANT_STATUSES: ListColumn<ExtantStatus> = ListColumn::core("hasExtantStatus");
    /// Habitats.
    pub const HABITATS: ListColumn<Habitat> = ListColumn::core("hasHabitat");
    /// Images.
    pub const IMAGES: ListColumn<Image> = ListColumn::core("hasImage");
    /// Free-text properties.
    pub const TEXT_PROPERTIES: ListColumn<SimpleProperty> = ListColumn::core("hasTextProperty");
    /// Higher classifications.
    pub const CLASSIFICATIONS: ListColumn<Classification> = ListColumn::core("hasClassification");
    /// Literature references.
    pub const REFERENCES: ListColumn<Reference> = ListColumn::core("hasReference");
    /// Publications.
    pub const PUBLICATIONS: ListColumn<Publication> = ListColumn::core("hasPublication");
}

/// Typed repository over a [`ConceptStore`].
#[derive(Clone)]
pub struct ConceptRepository {
    store: Arc<dyn ConceptStore>,
    max_append_attempts: usize,
}

impl std::fmt::Debug for ConceptRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConceptRepository")
            .field("max_append_attempts", &self.max_append_attempts)
            .finish_non_exhaustive()
    }
}

impl ConceptRepository {
    /// Default bound on compare-and-swap attempts per list update.
    pub const DEFAULT_MAX_APPEND_ATTEMPTS: usize = 16;

    /// Creates a repository over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ConceptStore>) -> Self {
        Self {
            store,
            max_append_attempts: Self::DEFAULT_MAX_APPEND_ATTEMPTS,
        }
    }

    /// Sets the compare-and-swap attempt bound (minimum 1).
    #[must_use]
    pub fn with_max_append_attempts(mut self, attempts: usize) -> Self {
        self.max_append_attempts = attempts.max(1);
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConceptStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Concepts
    // ------------------------------------------------------------------

    /// Writes every non-blank core field of `tc`.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn create(&self, tc: &TaxonConcept) -> Result<(), StorageError> {
        let mut cells = Vec::new();
        put_if_not_blank(&mut cells, columns::ID, Some(tc.guid.as_str()));
        put_if_not_blank(&mut cells, columns::PARENT_GUID, tc.parent_guid.as_deref());
        put_if_not_blank(&mut cells, columns::NAME_STRING, tc.name_string.as_deref());
        put_if_not_blank(&mut cells, columns::AUTHOR, tc.author.as_deref());
        self.put_concept_details(&tc.guid, tc, cells)
    }

    /// Writes the non-identity fields of an existing concept.
    ///
    /// Returns `false` (and writes nothing) if the concept does not exist.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn update(&self, tc: &TaxonConcept) -> Result<bool, StorageError> {
        if !self.exists(&tc.guid)? {
            warn!(guid = %tc.guid, "update skipped: concept does not exist");
            return Ok(false);
        }
        self.put_concept_details(&tc.guid, tc, Vec::new())?;
        Ok(true)
    }

    fn put_concept_details(
        &self,
        guid: &Guid,
        tc: &TaxonConcept,
        mut cells: Vec<(String, String)>,
    ) -> Result<(), StorageError> {
        put_if_not_blank(&mut cells, columns::AUTHOR_YEAR, tc.author_year.as_deref());
        put_if_not_blank(&mut cells, columns::PUBLISHED_IN, tc.published_in.as_deref());
        put_if_not_blank(
            &mut cells,
            columns::PUBLISHED_IN_CITATION,
            tc.published_in_citation.as_deref(),
        );
        put_if_not_blank(
            &mut cells,
            columns::ACCEPTED_CONCEPT_GUID,
            tc.accepted_concept_guid.as_deref(),
        );
        put_if_not_blank(&mut cells, columns::RANK_STRING, tc.rank_string.as_deref());
        put_if_not_blank(&mut cells, columns::INFO_SOURCE_ID, tc.info_source_id.as_deref());
        put_if_not_blank(&mut cells, columns::INFO_SOURCE_NAME, tc.info_source_name.as_deref());
        put_if_not_blank(&mut cells, columns::INFO_SOURCE_URL, tc.info_source_url.as_deref());
        self.store.put(guid, Family::Core, cells)
    }

    /// Creates every concept in order. Returns the number written.
    ///
    /// # Errors
    /// Stops at the first store failure.
    pub fn create_all(&self, concepts: &[TaxonConcept]) -> Result<usize, StorageError> {
        for tc in concepts {
            self.create(tc)?;
        }
        Ok(concepts.len())
    }

    /// Reads a concept's core fields.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn get(&self, guid: &Guid) -> Result<Option<TaxonConcept>, StorageError> {
        let row = self.store.get(guid, &FamilyFilter::only(Family::Core))?;
        Ok(row.map(|r| decode_concept(guid.clone(), &r)))
    }

    /// Returns true if the concept has a core row.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn exists(&self, guid: &Guid) -> Result<bool, StorageError> {
        Ok(self
            .store
            .get(guid, &FamilyFilter::only(Family::Core))?
            .is_some())
    }

    /// Deletes a concept row and every family in it.
    ///
    /// Relation lists on other concepts still referencing it are left alone.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn delete(&self, guid: &Guid) -> Result<bool, StorageError> {
        self.store.delete(guid)
    }

    // ------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------

    /// Stores nomenclatural detail for an existing concept.
    ///
    /// Returns `false` if the concept row does not exist.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn add_taxon_name(&self, guid: &Guid, name: &TaxonName) -> Result<bool, StorageError> {
        if !self.exists(guid)? {
            error!(guid = %guid, "unable to add taxon name: no concept row for GUID");
            return Ok(false);
        }
        let mut cells = Vec::new();
        put_if_not_blank(&mut cells, name_columns::GUID, name.guid.as_deref());
        put_if_not_blank(&mut cells, name_columns::NAME_COMPLETE, name.name_complete.as_deref());
        put_if_not_blank(&mut cells, name_columns::AUTHORSHIP, name.authorship.as_deref());
        put_if_not_blank(
            &mut cells,
            name_columns::NOMENCLATURAL_CODE,
            name.nomenclatural_code.as_deref(),
        );
        put_if_not_blank(
            &mut cells,
            name_columns::TYPIFICATION_STRING,
            name.typification_string.as_deref(),
        );
        put_if_not_blank(
            &mut cells,
            name_columns::PUBLISHED_IN_CITATION,
            name.published_in_citation.as_deref(),
        );
        put_if_not_blank(&mut cells, name_columns::PUBLISHED_IN, name.published_in.as_deref());
        put_if_not_blank(&mut cells, name_columns::RANK_STRING, name.rank_string.as_deref());
        self.store.put(guid, Family::Name, cells)?;
        Ok(true)
    }

    /// Reads nomenclatural detail.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn get_taxon_name(&self, guid: &Guid) -> Result<Option<TaxonName>, StorageError> {
        let row = self.store.get(guid, &FamilyFilter::only(Family::Name))?;
        Ok(row.as_ref().and_then(decode_taxon_name))
    }

    // ------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------

    /// Reads a list column; a missing column is an empty list.
    ///
    /// # Errors
    /// `StorageError::Serialization` if the stored list is not valid JSON.
    pub fn list<T: DeserializeOwned>(
        &self,
        guid: &Guid,
        column: ListColumn<T>,
    ) -> Result<Vec<T>, StorageError> {
        match self.store.get(guid, &FamilyFilter::only(column.family))? {
            Some(row) => decode_list(&row, column),
            None => Ok(Vec::new()),
        }
    }

    /// Appends one item to a list column. Returns the new list length.
    ///
    /// # Errors
    /// `StorageError::Contention` if every compare-and-swap attempt lost a
    /// race; other store failures propagate.
    pub fn append<T: Serialize + DeserializeOwned + Clone>(
        &self,
        guid: &Guid,
        column: ListColumn<T>,
        item: T,
    ) -> Result<usize, StorageError> {
        self.update_list(guid, column, |items| items.push(item.clone()))
    }

    /// Replaces a list column wholesale. Used for the administrative `set_*`
    /// operations; ingestion only ever appends.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn replace<T: Serialize>(
        &self,
        guid: &Guid,
        column: ListColumn<T>,
        items: &[T],
    ) -> Result<(), StorageError> {
        let value = serde_json::to_string(items)?;
        self.store
            .put(guid, column.family, vec![(column.name.to_string(), value)])
    }

    fn update_list<T, F>(
        &self,
        guid: &Guid,
        column: ListColumn<T>,
        mut apply: F,
    ) -> Result<usize, StorageError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(&mut Vec<T>),
    {
        for attempt in 1..=self.max_append_attempts {
            let row = self.store.get(guid, &FamilyFilter::only(column.family))?;
            let expected = row
                .as_ref()
                .and_then(|r| r.revision(column.family, column.name));
            let mut items = match &row {
                Some(r) => decode_list(r, column)?,
                None => Vec::new(),
            };
            apply(&mut items);
            let value = serde_json::to_string(&items)?;
            match self
                .store
                .compare_and_swap(guid, column.family, column.name, expected, value)
            {
                Ok(_) => return Ok(items.len()),
                Err(StorageError::RevisionConflict { .. }) => {
                    debug!(guid = %guid, column = column.name, attempt, "list update lost a race, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(StorageError::Contention {
            guid: guid.to_string(),
            column: column.name.to_string(),
            attempts: self.max_append_attempts,
        })
    }

    /// Replaces the extant statuses.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn set_extant_statuses(
        &self,
        guid: &Guid,
        statuses: &[ExtantStatus],
    ) -> Result<(), StorageError> {
        self.replace(guid, lists::EXTANT_STATUSES, statuses)
    }

    /// Replaces the habitats.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn set_habitats(&self, guid: &Guid, habitats: &[Habitat]) -> Result<(), StorageError> {
        self.replace(guid, lists::HABITATS, habitats)
    }

    /// Replaces the regions.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn set_regions(&self, guid: &Guid, regions: &[Region]) -> Result<(), StorageError> {
        self.replace(guid, lists::REGIONS, regions)
    }

    // ------------------------------------------------------------------
    // Relations (both sides through one routine)
    // ------------------------------------------------------------------

    fn link(
        &self,
        from: &ConceptRef,
        forward: ListColumn<ConceptRef>,
        to: &ConceptRef,
        backward: ListColumn<ConceptRef>,
    ) -> Result<(), StorageError> {
        self.append(&from.guid, forward, to.clone())?;
        if let Err(err) = self.append(&to.guid, backward, from.clone()) {
            // take the forward edge back out so neither side is left dangling
            let rollback = self.update_list(&from.guid, forward, |items| {
                if let Some(pos) = items.iter().rposition(|r| r == to) {
                    items.remove(pos);
                }
            });
            match rollback {
                Ok(_) => warn!(
                    from = %from.guid,
                    to = %to.guid,
                    column = forward.name,
                    error = %err,
                    "back edge failed, forward edge rolled back"
                ),
                Err(rollback_err) => error!(
                    from = %from.guid,
                    to = %to.guid,
                    column = forward.name,
                    error = %err,
                    rollback_error = %rollback_err,
                    "back edge failed and forward edge could not be rolled back"
                ),
            }
            return Err(err);
        }
        Ok(())
    }

    /// Records `synonym` as a synonym of `accepted` on both rows.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn link_synonym(
        &self,
        accepted: &ConceptRef,
        synonym: &ConceptRef,
    ) -> Result<(), StorageError> {
        self.link(accepted, lists::SYNONYMS, synonym, lists::IS_SYNONYM_FOR)
    }

    /// Records `congruent` as congruent to `accepted`. The back edge is an
    /// is-synonym-for entry, so the congruent concept resolves to `accepted`.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn link_congruent(
        &self,
        accepted: &ConceptRef,
        congruent: &ConceptRef,
    ) -> Result<(), StorageError> {
        self.link(accepted, lists::IS_CONGRUENT_TO, congruent, lists::IS_SYNONYM_FOR)
    }

    /// Records a parent/child edge on both rows.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn link_parent_child(
        &self,
        parent: &ConceptRef,
        child: &ConceptRef,
    ) -> Result<(), StorageError> {
        self.link(parent, lists::CHILDREN, child, lists::PARENTS)
    }

    // ------------------------------------------------------------------
    // Raw family
    // ------------------------------------------------------------------

    /// Stores raw literal values under `infoSourceId:documentId:fragment`
    /// columns of the raw family. A predicate repeated within one call gets
    /// an ordinal suffix from its second value on (`fragment:2`, `fragment:3`)
    /// so no value is lost; ingesting the same document again rewrites the
    /// same columns.
    ///
    /// Returns `false` if the concept row does not exist.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn add_literal_values(
        &self,
        guid: &Guid,
        info_source_id: &str,
        document_id: &str,
        values: &[(String, String)],
    ) -> Result<bool, StorageError> {
        if !self.exists(guid)? {
            error!(guid = %guid, "unable to add literal values: no concept row for GUID");
            return Ok(false);
        }
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        let mut cells = Vec::with_capacity(values.len());
        for (predicate, value) in values {
            let column = format!("{info_source_id}:{document_id}:{}", predicate_fragment(predicate));
            let count = seen.entry(column.clone()).or_insert(0);
            *count += 1;
            let column = if *count == 1 {
                column
            } else {
                debug!(guid = %guid, column = %column, ordinal = *count, "repeated raw predicate");
                format!("{column}:{count}")
            };
            cells.push((column, value.clone()));
        }
        self.store.put(guid, Family::Raw, cells)?;
        Ok(true)
    }

    /// Removes the raw family from every row. Returns the rows touched.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn clear_raw_properties(&self) -> Result<usize, StorageError> {
        self.store.delete_family(Family::Raw)
    }

    /// Every stored cell of a concept as `family:column -> value`, sorted.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn properties_for(&self, guid: &Guid) -> Result<BTreeMap<String, String>, StorageError> {
        let Some(row) = self.store.get(guid, &FamilyFilter::All)? else {
            return Ok(BTreeMap::new());
        };
        Ok(row
            .families
            .iter()
            .flat_map(|(family, cols)| {
                cols.iter()
                    .map(move |(col, cell)| (format!("{family}:{col}"), cell.value.clone()))
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Extended view
    // ------------------------------------------------------------------

    /// Assembles everything known about a concept from one row read.
    ///
    /// # Errors
    /// Propagates store and decoding failures.
    pub fn get_extended(&self, guid: &Guid) -> Result<Option<ExtendedTaxonConcept>, StorageError> {
        let Some(row) = self.store.get(guid, &FamilyFilter::All)? else {
            return Ok(None);
        };
        if row.family_is_empty(Family::Core) {
            return Ok(None);
        }
        let classifications: Vec<Classification> = decode_list(&row, lists::CLASSIFICATIONS)?;
        let regions: Vec<Region> = decode_list(&row, lists::REGIONS)?;
        let mut simple_properties: Vec<SimpleProperty> = decode_list(&row, lists::TEXT_PROPERTIES)?;
        simple_properties.sort();

        let common_names: Vec<CommonName> = decode_list(&row, lists::COMMON_NAMES)?;
        let pest_statuses: Vec<PestStatus> = decode_list(&row, lists::PEST_STATUSES)?;
        let conservation_statuses: Vec<ConservationStatus> =
            decode_list(&row, lists::CONSERVATION_STATUSES)?;
        let images: Vec<Image> = decode_list(&row, lists::IMAGES)?;
        let references: Vec<Reference> = decode_list(&row, lists::REFERENCES)?;

        Ok(Some(ExtendedTaxonConcept {
            taxon_concept: decode_concept(guid.clone(), &row),
            taxon_name: decode_taxon_name(&row),
            classification: classifications.into_iter().next(),
            synonyms: decode_list(&row, lists::SYNONYMS)?,
            common_names,
            child_concepts: decode_list(&row, lists::CHILDREN)?,
            parent_concepts: decode_list(&row, lists::PARENTS)?,
            pest_statuses,
            conservation_statuses,
            images,
            extant_statuses: decode_list(&row, lists::EXTANT_STATUSES)?,
            habitats: decode_list(&row, lists::HABITATS)?,
            region_types: Region::group_by_type(&regions),
            references,
            simple_properties,
        }))
    }
}

fn put_if_not_blank(cells: &mut Vec<(String, String)>, column: &str, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        cells.push((column.to_string(), v.to_string()));
    }
}

/// Fragment after the last `#`, else the last path segment.
pub(crate) fn predicate_fragment(predicate: &str) -> &str {
    predicate
        .rsplit_once('#')
        .or_else(|| predicate.rsplit_once('/'))
        .map_or(predicate, |(_, fragment)| fragment)
}

fn text(row: &ConceptRow, family: Family, column: &str) -> Option<String> {
    row.value(family, column).map(str::to_string)
}

/// Decodes core fields. The GUID comes from the row key.
pub(crate) fn decode_concept(guid: Guid, row: &ConceptRow) -> TaxonConcept {
    let core = |column| text(row, Family::Core, column);
    TaxonConcept {
        guid,
        name_string: core(columns::NAME_STRING),
        author: core(columns::AUTHOR),
        author_year: core(columns::AUTHOR_YEAR),
        rank_string: core(columns::RANK_STRING),
        published_in: core(columns::PUBLISHED_IN),
        published_in_citation: core(columns::PUBLISHED_IN_CITATION),
        accepted_concept_guid: core(columns::ACCEPTED_CONCEPT_GUID),
        parent_guid: core(columns::PARENT_GUID),
        info_source_id: core(columns::INFO_SOURCE_ID),
        info_source_name: core(columns::INFO_SOURCE_NAME),
        info_source_url: core(columns::INFO_SOURCE_URL),
    }
}

fn decode_taxon_name(row: &ConceptRow) -> Option<TaxonName> {
    if row.family_is_empty(Family::Name) {
        return None;
    }
    let tn = |column| text(row, Family::Name, column);
    Some(TaxonName {
        guid: tn(name_columns::GUID),
        name_complete: tn(name_columns::NAME_COMPLETE),
        authorship: tn(name_columns::AUTHORSHIP),
        nomenclatural_code: tn(name_columns::NOMENCLATURAL_CODE),
        typification_string: tn(name_columns::TYPIFICATION_STRING),
        published_in_citation: tn(name_columns::PUBLISHED_IN_CITATION),
        published_in: tn(name_columns::PUBLISHED_IN),
        rank_string: tn(name_columns::RANK_STRING),
    })
}

/// Decodes a list column from an already-read row.
pub(crate) fn decode_list<T: DeserializeOwned>(
    row: &ConceptRow,
    column: ListColumn<T>,
) -> Result<Vec<T>, StorageError> {
    match row.value(column.family, column.name) {
        Some(json) => serde_json::from_str(json).map_err(|e| {
            StorageError::Serialization(format!(
                "{}:{} of {}: {e}",
                column.family, column.name, row.guid
            ))
        }),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::facts::Provenance;
    use crate::storage::{InMemoryConceptStore, RowScan};

    fn repo() -> ConceptRepository {
        ConceptRepository::new(Arc::new(InMemoryConceptStore::new()))
    }

    fn guid(s: &str) -> Guid {
        Guid::parse(s).unwrap()
    }

    fn wolf() -> TaxonConcept {
        TaxonConcept::builder()
            .guid("urn:lsid:afd:wolf")
            .name_string("Canis lupus")
            .author("Linnaeus")
            .author_year("1758")
            .rank_string("species")
            .parent_guid("urn:lsid:afd:canis")
            .info_source_id("1")
            .build()
            .unwrap()
    }

    /// Delegates to an in-memory store but loses every compare-and-swap.
    struct AlwaysConflicting(InMemoryConceptStore);

    impl ConceptStore for AlwaysConflicting {
        fn get(&self, g: &Guid, f: &FamilyFilter) -> Result<Option<ConceptRow>, StorageError> {
            self.0.get(g, f)
        }
        fn put(&self, g: &Guid, fam: Family, c: Vec<(String, String)>) -> Result<(), StorageError> {
            self.0.put(g, fam, c)
        }
        fn compare_and_swap(
            &self,
            g: &Guid,
            _f: Family,
            column: &str,
            expected: Option<u64>,
            _v: String,
        ) -> Result<u64, StorageError> {
            Err(StorageError::RevisionConflict {
                guid: g.to_string(),
                column: column.to_string(),
                expected,
                actual: Some(u64::MAX),
            })
        }
        fn delete(&self, g: &Guid) -> Result<bool, StorageError> {
            self.0.delete(g)
        }
        fn delete_family(&self, f: Family) -> Result<usize, StorageError> {
            self.0.delete_family(f)
        }
        fn scan(&self, f: FamilyFilter) -> Result<RowScan<'_>, StorageError> {
            self.0.scan(f)
        }
        fn row_count(&self) -> Result<usize, StorageError> {
            self.0.row_count()
        }
    }

    #[test]
    fn test_create_get_roundtrip() {
        let repo = repo();
        let tc = wolf();
        repo.create(&tc).unwrap();
        assert_eq!(repo.get(&tc.guid).unwrap(), Some(tc));
        assert_eq!(repo.get(&guid("urn:missing")).unwrap(), None);
    }

    #[test]
    fn test_blank_fields_are_not_written() {
        let repo = repo();
        let tc = TaxonConcept::builder()
            .guid("urn:1")
            .name_string("Vulpes vulpes")
            .author("   ")
            .build()
            .unwrap();
        repo.create(&tc).unwrap();
        let props = repo.properties_for(&tc.guid).unwrap();
        assert!(props.contains_key("tc:nameString"));
        assert!(!props.contains_key("tc:author"));
    }

    #[test]
    fn test_update_leaves_identity_fields_alone() {
        let repo = repo();
        repo.create(&wolf()).unwrap();

        let changed = TaxonConcept::builder()
            .guid("urn:lsid:afd:wolf")
            .name_string("Renamed")
            .rank_string("subspecies")
            .build()
            .unwrap();
        assert!(repo.update(&changed).unwrap());

        let stored = repo.get(&changed.guid).unwrap().unwrap();
        assert_eq!(stored.name_string.as_deref(), Some("Canis lupus"));
        assert_eq!(stored.rank_string.as_deref(), Some("subspecies"));

        let absent = TaxonConcept::builder().guid("urn:none").build().unwrap();
        assert!(!repo.update(&absent).unwrap());
        assert!(repo.get(&absent.guid).unwrap().is_none());
    }

    #[test]
    fn test_taxon_name_requires_concept_row() {
        let repo = repo();
        let name = TaxonName {
            name_complete: Some("Canis lupus Linnaeus, 1758".into()),
            nomenclatural_code: Some("ICZN".into()),
            ..TaxonName::default()
        };
        let g = guid("urn:lsid:afd:wolf");
        assert!(!repo.add_taxon_name(&g, &name).unwrap());
        assert!(repo.get_taxon_name(&g).unwrap().is_none());

        repo.create(&wolf()).unwrap();
        assert!(repo.add_taxon_name(&g, &name).unwrap());
        assert_eq!(repo.get_taxon_name(&g).unwrap(), Some(name));
    }

    #[test]
    fn test_sequential_appends_keep_call_order() {
        let repo = repo();
        let g = guid("urn:1");
        for i in 0..5 {
            let n = repo
                .append(&g, lists::COMMON_NAMES, CommonName::new(format!("name-{i}"), Provenance::default()))
                .unwrap();
            assert_eq!(n, i + 1);
        }
        let names: Vec<String> = repo
            .list(&g, lists::COMMON_NAMES)
            .unwrap()
            .into_iter()
            .map(|c| c.name_string)
            .collect();
        assert_eq!(names, ["name-0", "name-1", "name-2", "name-3", "name-4"]);
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let repo = repo().with_max_append_attempts(10_000);
        let g = guid("urn:busy");
        thread::scope(|s| {
            for t in 0..8 {
                let repo = &repo;
                let g = &g;
                s.spawn(move || {
                    for i in 0..25 {
                        repo.append(
                            g,
                            lists::TEXT_PROPERTIES,
                            SimpleProperty {
                                name: format!("t{t}"),
                                value: i.to_string(),
                                provenance: Provenance::default(),
                            },
                        )
                        .unwrap();
                    }
                });
            }
        });
        assert_eq!(repo.list(&g, lists::TEXT_PROPERTIES).unwrap().len(), 200);
    }

    #[test]
    fn test_append_gives_up_with_contention() {
        let repo = ConceptRepository::new(Arc::new(AlwaysConflicting(InMemoryConceptStore::new())))
            .with_max_append_attempts(3);
        let err = repo
            .append(&guid("urn:1"), lists::COMMON_NAMES, CommonName::new("x", Provenance::default()))
            .unwrap_err();
        assert!(matches!(err, StorageError::Contention { attempts: 3, .. }));
    }

    #[test]
    fn test_link_routines_write_both_sides() {
        let repo = repo();
        let accepted = ConceptRef::new(guid("urn:accepted"), Some("Canis lupus".into()));
        let synonym = ConceptRef::new(guid("urn:syn"), Some("Canis lycaon".into()));
        let child = ConceptRef::new(guid("urn:child"), Some("Canis lupus dingo".into()));

        repo.link_synonym(&accepted, &synonym).unwrap();
        repo.link_parent_child(&accepted, &child).unwrap();

        assert_eq!(repo.list(&accepted.guid, lists::SYNONYMS).unwrap(), vec![synonym.clone()]);
        assert_eq!(repo.list(&synonym.guid, lists::IS_SYNONYM_FOR).unwrap(), vec![accepted.clone()]);
        assert_eq!(repo.list(&accepted.guid, lists::CHILDREN).unwrap(), vec![child.clone()]);
        assert_eq!(repo.list(&child.guid, lists::PARENTS).unwrap(), vec![accepted]);
    }

    /// Delegates to an in-memory store but fails every compare-and-swap on
    /// one row with `Unavailable`.
    struct FailingRow {
        inner: InMemoryConceptStore,
        failing: Guid,
    }

    impl ConceptStore for FailingRow {
        fn get(&self, g: &Guid, f: &FamilyFilter) -> Result<Option<ConceptRow>, StorageError> {
            self.inner.get(g, f)
        }
        fn put(&self, g: &Guid, fam: Family, c: Vec<(String, String)>) -> Result<(), StorageError> {
            self.inner.put(g, fam, c)
        }
        fn compare_and_swap(
            &self,
            g: &Guid,
            f: Family,
            column: &str,
            expected: Option<u64>,
            v: String,
        ) -> Result<u64, StorageError> {
            if *g == self.failing {
                return Err(StorageError::Unavailable {
                    message: "region server down".to_string(),
                });
            }
            self.inner.compare_and_swap(g, f, column, expected, v)
        }
        fn delete(&self, g: &Guid) -> Result<bool, StorageError> {
            self.inner.delete(g)
        }
        fn delete_family(&self, f: Family) -> Result<usize, StorageError> {
            self.inner.delete_family(f)
        }
        fn scan(&self, f: FamilyFilter) -> Result<RowScan<'_>, StorageError> {
            self.inner.scan(f)
        }
        fn row_count(&self) -> Result<usize, StorageError> {
            self.inner.row_count()
        }
    }

    #[test]
    fn test_failed_back_edge_rolls_back_forward_edge() {
        let accepted = ConceptRef::new(guid("urn:acc"), Some("Canis lupus".into()));
        let earlier = ConceptRef::new(guid("urn:old"), Some("Canis lycaon".into()));
        let synonym = ConceptRef::new(guid("urn:syn"), Some("Canis nubilus".into()));
        let repo = ConceptRepository::new(Arc::new(FailingRow {
            inner: InMemoryConceptStore::new(),
            failing: synonym.guid.clone(),
        }));
        repo.append(&accepted.guid, lists::SYNONYMS, earlier.clone()).unwrap();

        let err = repo.link_synonym(&accepted, &synonym).unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }), "got {err:?}");

        // both sides agree: no edge on either row, earlier entries untouched
        assert_eq!(repo.list(&accepted.guid, lists::SYNONYMS).unwrap(), vec![earlier]);
        assert!(repo.list(&synonym.guid, lists::IS_SYNONYM_FOR).unwrap().is_empty());
    }

    #[test]
    fn test_set_replaces_wholesale() {
        let repo = repo();
        let g = guid("urn:1");
        let habitat = |s: &str| Habitat {
            status: s.to_string(),
            provenance: Provenance::default(),
        };
        repo.set_habitats(&g, &[habitat("Marine"), habitat("Terrestrial")]).unwrap();
        repo.set_habitats(&g, &[habitat("Freshwater")]).unwrap();
        let stored = repo.list(&g, lists::HABITATS).unwrap();
        assert_eq!(stored, vec![habitat("Freshwater")]);
    }

    #[test]
    fn test_extended_view() {
        let repo = repo();
        let tc = wolf();
        repo.create(&tc).unwrap();
        repo.append(&tc.guid, lists::COMMON_NAMES, CommonName::new("Grey Wolf", Provenance::from_source("1")))
            .unwrap();
        for (name, value) in [("hasHabitatText", "Forest"), ("hasDescriptiveText", "Large")] {
            repo.append(
                &tc.guid,
                lists::TEXT_PROPERTIES,
                SimpleProperty {
                    name: name.into(),
                    value: value.into(),
                    provenance: Provenance::default(),
                },
            )
            .unwrap();
        }
        repo.set_regions(
            &tc.guid,
            &[Region {
                name: "NSW".into(),
                region_type: Some("State".into()),
                occurrences: Some(3),
                provenance: Provenance::default(),
            }],
        )
        .unwrap();

        let ext = repo.get_extended(&tc.guid).unwrap().unwrap();
        assert_eq!(ext.taxon_concept, tc);
        assert_eq!(ext.common_names.len(), 1);
        assert_eq!(ext.simple_properties[0].name, "hasDescriptiveText");
        assert_eq!(ext.region_types["State"][0].name, "NSW");
        assert!(ext.taxon_name.is_none());
        assert!(repo.get_extended(&guid("urn:missing")).unwrap().is_none());
    }

    #[test]
    fn test_raw_literals_and_clear() {
        let repo = repo();
        let tc = wolf();
        repo.create(&tc).unwrap();
        assert!(repo
            .add_literal_values(
                &tc.guid,
                "1013",
                "77",
                &[("http://ala.org.au/ontology/ALA#hasHabitatText".into(), "Forest".into())],
            )
            .unwrap());
        let props = repo.properties_for(&tc.guid).unwrap();
        assert_eq!(props.get("raw:1013:77:hasHabitatText").map(String::as_str), Some("Forest"));

        assert_eq!(repo.clear_raw_properties().unwrap(), 1);
        let props = repo.properties_for(&tc.guid).unwrap();
        assert!(props.keys().all(|k| !k.starts_with("raw:")));
        assert!(repo.get(&tc.guid).unwrap().is_some());
    }

    #[test]
    fn test_repeated_raw_predicates_keep_every_value() {
        let repo = repo();
        let tc = wolf();
        repo.create(&tc).unwrap();
        let values: Vec<(String, String)> = ["Forest", "Tundra", "Steppe"]
            .into_iter()
            .map(|v| ("http://ala.org.au/ontology/ALA#hasHabitatText".to_string(), v.to_string()))
            .chain([("tc#hasRegion".to_string(), "Holarctic".to_string())])
            .collect();
        assert!(repo.add_literal_values(&tc.guid, "1013", "77", &values).unwrap());
        // same document again: same columns, nothing duplicated
        assert!(repo.add_literal_values(&tc.guid, "1013", "77", &values).unwrap());

        let props = repo.properties_for(&tc.guid).unwrap();
        let raw: Vec<(&str, &str)> = props
            .iter()
            .filter(|(k, _)| k.starts_with("raw:"))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            raw,
            vec![
                ("raw:1013:77:hasHabitatText", "Forest"),
                ("raw:1013:77:hasHabitatText:2", "Tundra"),
                ("raw:1013:77:hasHabitatText:3", "Steppe"),
                ("raw:1013:77:hasRegion", "Holarctic"),
            ]
        );
    }

    #[test]
    fn test_raw_literals_missing_row() {
        let repo = repo();
        assert!(!repo
            .add_literal_values(&guid("urn:missing"), "1", "2", &[("p".into(), "v".into())])
            .unwrap());
        assert!(repo.get(&guid("urn:missing")).unwrap().is_none());
    }

    #[test]
    fn test_predicate_fragment() {
        assert_eq!(predicate_fragment("http://x.org/onto#hasGenus"), "hasGenus");
        assert_eq!(predicate_fragment("http://x.org/onto/hasGenus"), "hasGenus");
        assert_eq!(predicate_fragment("hasGenus"), "hasGenus");
    }
}
