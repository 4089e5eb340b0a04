//! # taxonstore - Taxonomic Knowledge Store
//!
//! taxonstore persists facts about biological taxa (names, synonyms,
//! statuses, habitats, common names, classifications) keyed by GUID, and
//! derives from them a rebuildable search index for name lookup, status
//! filtering and paging.
//!
//! ## Core Concepts
//!
//! - **Concept store**: GUID-keyed rows with core, name and raw families;
//!   one-to-many facts are JSON lists updated by compare-and-swap
//! - **Index**: a disposable derivative of the store, built by a full scan
//!   into a new generation and swapped in only once complete
//! - **Ingestion**: extracted triples are classified, resolved to one
//!   concept through a name authority, then merged fact by fact
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taxonstore::{InMemoryNameResolver, InMemoryVocabulary, PageRequest, SourceDocument, TaxonEngine, Triple};
//!
//! let engine = TaxonEngine::in_memory(
//!     Arc::new(InMemoryNameResolver::new()),
//!     Arc::new(InMemoryVocabulary::new()),
//! )?;
//!
//! let doc = SourceDocument::new("/data/1013/42", "1013", "42");
//! engine.ingest(&doc, &[
//!     Triple::new("tc#hasGenus", "Canis"),
//!     Triple::new("tc#hasSpecificEpithet", "lupus"),
//!     Triple::new("tc#hasCommonName", "Wolf"),
//! ])?;
//!
//! engine.rebuild_index()?;
//! let page = engine.search_by_name(Some("wolf"), &PageRequest::default())?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod concept;
pub mod error;
pub mod facts;
pub mod guid;
pub mod rank;

// Collaborators and configuration
pub mod config;
pub mod logging;
pub mod resolver;
pub mod vocabulary;

// Storage, index, queries and ingestion
pub mod engine;
pub mod index;
pub mod ingest;
pub mod query;
pub mod repository;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use concept::{ConceptRef, ExtendedTaxonConcept, TaxonConcept, TaxonName};
pub use config::{BoostConfig, IndexConfig, IngestConfig, RuntimeConfig, TaxonConfig};
pub use error::{
	ExecutionError, IndexError, IngestError, QueryError, ResolverError, TaxonError, TaxonResult,
	ValidationError,
};
pub use facts::{CommonName, Provenance, SimpleProperty, StatusFact};
pub use guid::Guid;
pub use rank::Rank;

pub use engine::runtime::{ExecutionHandle, TaxonRuntime, WorkerPoolKind};
pub use engine::TaxonEngine;
pub use index::{IndexBuilder, IndexHandle, RebuildReport};
pub use ingest::{IngestReport, IngestionPipeline, SourceDocument, Triple};
pub use query::{PageRequest, QueryEngine, SearchResults, SearchStatus, SearchTaxonConcept, SortDirection, SortField};
pub use repository::ConceptRepository;
pub use resolver::{InMemoryNameResolver, NameQuery, NameResolver, TimeoutResolver};
pub use storage::{ConceptStore, InMemoryConceptStore, StorageError};
pub use vocabulary::{InMemoryVocabulary, StatusType, Vocabulary};
