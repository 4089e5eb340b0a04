//! Synchronous engine wiring the concept store, index, queries and ingestion.
//!
//! `TaxonEngine` owns no global state: the live index generation lives in an
//! [`IndexHandle`] injected at construction, so several engines (or tests)
//! can run side by side.

/// Bounded worker runtime for ingestion batches and index rebuilds.
pub mod runtime;

use std::sync::Arc;

use crate::concept::ExtendedTaxonConcept;
use crate::config::TaxonConfig;
use crate::error::TaxonResult;
use crate::guid::Guid;
use crate::index::{IndexBuilder, IndexHandle, RebuildReport};
use crate::ingest::{IngestReport, IngestionPipeline, SourceDocument, Triple};
use crate::query::{PageRequest, QueryEngine, SearchResults, SearchTaxonConcept};
use crate::repository::ConceptRepository;
use crate::resolver::{NameResolver, TimeoutResolver};
use crate::storage::{ConceptStore, InMemoryConceptStore};
use crate::vocabulary::{StatusType, Vocabulary};

/// Taxon store engine.
pub struct TaxonEngine {
    config: TaxonConfig,
    repository: ConceptRepository,
    index: Arc<IndexHandle>,
    builder: IndexBuilder,
    query: QueryEngine,
    pipeline: IngestionPipeline,
}

impl std::fmt::Debug for TaxonEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaxonEngine")
            .field("config", &self.config)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl TaxonEngine {
    /// Creates an engine over `store`.
    ///
    /// The resolver is wrapped so every call is bounded by
    /// `config.ingest.resolve_timeout`. With `config.index.directory` set the
    /// newest complete index generation found there is served immediately;
    /// otherwise queries report the index as not ready until the first rebuild.
    ///
    /// # Errors
    /// - `TaxonError::Validation` if the configuration is invalid
    /// - `TaxonError::Index` if the index directory cannot be opened
    pub fn new(
        store: Arc<dyn ConceptStore>,
        resolver: Arc<dyn NameResolver>,
        vocabulary: Arc<dyn Vocabulary>,
        config: TaxonConfig,
    ) -> TaxonResult<Self> {
        let config = config.validate()?;
        let index = Arc::new(match &config.index.directory {
            Some(dir) => IndexHandle::open(dir)?,
            None => IndexHandle::in_memory(),
        });
        let repository = ConceptRepository::new(store)
            .with_max_append_attempts(config.ingest.max_append_attempts);
        let resolver: Arc<dyn NameResolver> =
            Arc::new(TimeoutResolver::new(resolver, config.ingest.resolve_timeout));

        Ok(Self {
            builder: IndexBuilder::new(config.index.clone(), Arc::clone(&vocabulary)),
            query: QueryEngine::new(Arc::clone(&index), Arc::clone(&vocabulary), config.index.boosts),
            pipeline: IngestionPipeline::new(repository.clone(), resolver, vocabulary),
            repository,
            index,
            config,
        })
    }

    /// Engine over a fresh in-memory store with default configuration.
    ///
    /// # Errors
    /// See [`TaxonEngine::new`].
    pub fn in_memory(
        resolver: Arc<dyn NameResolver>,
        vocabulary: Arc<dyn Vocabulary>,
    ) -> TaxonResult<Self> {
        Self::new(
            Arc::new(InMemoryConceptStore::new()),
            resolver,
            vocabulary,
            TaxonConfig::default(),
        )
    }

    /// Engine over a persistent store at `path`.
    ///
    /// # Errors
    /// `TaxonError::Storage` if the store cannot be opened or is locked by
    /// another process; otherwise as [`TaxonEngine::new`].
    #[cfg(feature = "persistent")]
    pub fn open_persistent(
        path: impl AsRef<std::path::Path>,
        resolver: Arc<dyn NameResolver>,
        vocabulary: Arc<dyn Vocabulary>,
        config: TaxonConfig,
    ) -> TaxonResult<Self> {
        let store = crate::storage::persistent::open_concept_store(
            path,
            Some(config.persistent.clone()),
        )?;
        Self::new(Arc::new(store), resolver, vocabulary, config)
    }

    /// Validated configuration.
    #[must_use]
    pub const fn config(&self) -> &TaxonConfig {
        &self.config
    }

    /// Typed access to the concept store.
    #[must_use]
    pub const fn repository(&self) -> &ConceptRepository {
        &self.repository
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConceptStore> {
        self.repository.store()
    }

    /// Handle to the live index generation.
    #[must_use]
    pub fn index(&self) -> &Arc<IndexHandle> {
        &self.index
    }

    /// Query engine.
    #[must_use]
    pub const fn query(&self) -> &QueryEngine {
        &self.query
    }

    /// Ingests one document's triples.
    ///
    /// # Errors
    /// `TaxonError::Ingest` if the batch cannot be identified or a
    /// collaborator fails.
    pub fn ingest(&self, document: &SourceDocument, triples: &[Triple]) -> TaxonResult<IngestReport> {
        Ok(self.pipeline.ingest(document, triples)?)
    }

    /// Rebuilds the search index from a full store scan and swaps it in.
    ///
    /// # Errors
    /// `TaxonError::Index`, including `RebuildInProgress` when another
    /// rebuild is running.
    pub fn rebuild_index(&self) -> TaxonResult<RebuildReport> {
        Ok(self.builder.rebuild(self.store().as_ref(), &self.index)?)
    }

    /// Everything known about one concept.
    ///
    /// # Errors
    /// `TaxonError::Validation` for a blank GUID; store failures propagate.
    pub fn get_extended(&self, guid: &str) -> TaxonResult<Option<ExtendedTaxonConcept>> {
        let guid = Guid::parse(guid)?;
        Ok(self.repository.get_extended(&guid)?)
    }

    /// See [`QueryEngine::search_by_name`].
    ///
    /// # Errors
    /// `TaxonError::Query` for malformed input or index failures.
    pub fn search_by_name(&self, input: Option<&str>, page: &PageRequest) -> TaxonResult<SearchResults> {
        Ok(self.query.search_by_name(input, page)?)
    }

    /// See [`QueryEngine::find_all_by_status`].
    ///
    /// # Errors
    /// `TaxonError::Query` on index failures.
    pub fn find_all_by_status(&self, status: StatusType, page: &PageRequest) -> TaxonResult<SearchResults> {
        Ok(self.query.find_all_by_status(status, page)?)
    }

    /// See [`QueryEngine::find_by_parent`].
    ///
    /// # Errors
    /// `TaxonError::Query` on index failures.
    pub fn find_by_parent(&self, parent_guid: &str, limit: usize) -> TaxonResult<Vec<SearchTaxonConcept>> {
        Ok(self.query.find_by_parent(parent_guid, limit)?)
    }

    /// See [`QueryEngine::find_concept_id_for_name`].
    ///
    /// # Errors
    /// `TaxonError::Query` on index failures.
    pub fn find_concept_id_for_name(
        &self,
        kingdom: Option<&str>,
        genus: Option<&str>,
        scientific_name: &str,
    ) -> TaxonResult<Option<Guid>> {
        Ok(self
            .query
            .find_concept_id_for_name(kingdom, genus, scientific_name)?)
    }

    /// See [`QueryEngine::search_text`].
    ///
    /// # Errors
    /// `TaxonError::Query` for malformed input or index failures.
    pub fn search_text(&self, input: Option<&str>, page: &PageRequest) -> TaxonResult<SearchResults> {
        Ok(self.query.search_text(input, page)?)
    }

    /// See [`QueryEngine::find_by_scientific_name`].
    ///
    /// # Errors
    /// `TaxonError::Query` for malformed input or index failures.
    pub fn find_by_scientific_name(&self, input: &str, limit: usize) -> TaxonResult<Vec<SearchTaxonConcept>> {
        Ok(self.query.find_by_scientific_name(input, limit)?)
    }
}
