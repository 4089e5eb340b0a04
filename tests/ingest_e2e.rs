//! End-to-end tests for the ingestion pipeline.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use taxonstore::error::{IngestError, ResolverError};
use taxonstore::facts::CommonName;
use taxonstore::guid::Guid;
use taxonstore::repository::lists;
use taxonstore::storage::{ConceptRow, ConceptStore, Family, FamilyFilter, RowScan, StorageError};
use taxonstore::{
    InMemoryConceptStore, InMemoryNameResolver, InMemoryVocabulary, NameQuery, NameResolver,
    PageRequest, Rank, SourceDocument, StatusType, TaxonConcept, TaxonConfig, TaxonEngine,
    TaxonError, Triple,
};

const WOLF: &str = "urn:lsid:biodiversity.org.au:afd.taxon:wolf";

fn wolf() -> Guid {
    Guid::parse(WOLF).unwrap()
}

fn doc() -> SourceDocument {
    SourceDocument::new("/data/bie/1013/42", "1013", "42")
        .publisher("Australian Museum", "https://australian.museum")
        .titled("Dingo", "https://australian.museum/dingo")
}

fn engine_with(resolver: Arc<InMemoryNameResolver>) -> TaxonEngine {
    let vocabulary = InMemoryVocabulary::new()
        .with_terms(StatusType::Conservation, ["Endangered", "Vulnerable"])
        .with_mapping("1013", StatusType::Conservation, "EN", "Endangered");
    TaxonEngine::in_memory(resolver, Arc::new(vocabulary)).unwrap()
}

fn wolf_resolver() -> Arc<InMemoryNameResolver> {
    Arc::new(InMemoryNameResolver::new().with_name("Canis lupus", Some(Rank::Species), wolf()))
}

#[test]
fn test_genus_and_epithet_resolve_and_merge_common_name() {
    let resolver = wolf_resolver();
    let engine = engine_with(Arc::clone(&resolver));

    let report = engine
        .ingest(
            &doc(),
            &[
                Triple::new("http://rs.tdwg.org/ontology/voc/TaxonConcept#hasGenus", "Canis"),
                Triple::new("http://rs.tdwg.org/ontology/voc/TaxonConcept#hasSpecificEpithet", "lupus"),
                Triple::new("http://rs.tdwg.org/ontology/voc/TaxonConcept#hasCommonName", "Wolf"),
            ],
        )
        .unwrap();

    assert_eq!(report.guid, wolf());
    assert_eq!(report.name, "Canis lupus");
    assert_eq!(report.rank, Some(Rank::Species));
    assert_eq!(report.attempts, 1);
    assert!(report.created_concept);

    let calls = resolver.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].scientific_name, "Canis lupus");
    assert_eq!(calls[0].genus.as_deref(), Some("Canis"));
    assert_eq!(calls[0].rank, Some(Rank::Species));

    let names = engine.repository().list(&wolf(), lists::COMMON_NAMES).unwrap();
    assert_eq!(names.len(), 1);
    assert_eq!(names[0].name_string, "Wolf");
    assert_eq!(names[0].provenance.info_source_id.as_deref(), Some("1013"));
    assert_eq!(names[0].provenance.document_id.as_deref(), Some("42"));
    assert_eq!(
        names[0].provenance.info_source_name.as_deref(),
        Some("Australian Museum")
    );

    let concept = engine.repository().get(&wolf()).unwrap().unwrap();
    assert_eq!(concept.name_string.as_deref(), Some("Canis lupus"));
    assert_eq!(concept.rank_string.as_deref(), Some("species"));
}

#[test]
fn test_no_hierarchy_fails_without_writing() {
    let resolver = wolf_resolver();
    let engine = engine_with(Arc::clone(&resolver));

    let err = engine
        .ingest(&doc(), &[Triple::new("ala#hasHabitatText", "Forest")])
        .unwrap_err();
    assert!(matches!(
        err,
        TaxonError::Ingest(IngestError::InsufficientData { ref file_path }) if file_path == "/data/bie/1013/42"
    ));
    assert!(resolver.calls().is_empty());
    assert_eq!(engine.store().row_count().unwrap(), 0);
}

#[test]
fn test_unresolved_name_retries_then_fails() {
    let resolver = Arc::new(InMemoryNameResolver::new());
    let engine = engine_with(Arc::clone(&resolver));

    let err = engine
        .ingest(
            &doc(),
            &[
                Triple::new("tc#hasScientificName", "Canis lupus dingo"),
                Triple::new("tc#hasSpecies", "Canis lupus"),
                Triple::new("tc#hasGenus", "Canis"),
                Triple::new("tc#hasSpecificEpithet", "familiaris"),
                Triple::new("tc#hasCommonName", "Dingo"),
            ],
        )
        .unwrap_err();

    let TaxonError::Ingest(IngestError::NameNotResolved { name, attempts }) = &err else {
        panic!("expected NameNotResolved, got {err:?}");
    };
    assert_eq!(name, "Canis lupus dingo");
    assert_eq!(*attempts, 3);

    let tried: Vec<(String, Option<Rank>)> = resolver
        .calls()
        .into_iter()
        .map(|q| (q.scientific_name, q.rank))
        .collect();
    assert_eq!(
        tried,
        vec![
            ("Canis lupus dingo".to_string(), None),
            ("Canis lupus".to_string(), Some(Rank::Species)),
            ("Canis familiaris".to_string(), Some(Rank::Species)),
        ]
    );
    assert_eq!(engine.store().row_count().unwrap(), 0);
}

#[test]
fn test_retry_with_species_name_succeeds() {
    let resolver = wolf_resolver();
    let engine = engine_with(Arc::clone(&resolver));
    let report = engine
        .ingest(
            &doc(),
            &[
                Triple::new("tc#hasScientificName", "Canis lupus Linnaeus 1758"),
                Triple::new("tc#hasSpecies", "Canis lupus"),
            ],
        )
        .unwrap();
    assert_eq!(report.attempts, 2);
    assert_eq!(report.guid, wolf());
}

#[test]
fn test_reingestion_appends() {
    let engine = engine_with(wolf_resolver());
    let triples = [
        Triple::new("tc#hasSpecies", "Canis lupus"),
        Triple::new("tc#hasCommonName", "Wolf"),
        Triple::new("tc#hasConservationStatus", "EN"),
    ];
    let first = engine.ingest(&doc(), &triples).unwrap();
    let second = engine.ingest(&doc(), &triples).unwrap();
    assert!(first.created_concept);
    assert!(!second.created_concept);
    assert_ne!(first.batch_id, second.batch_id);

    let repo = engine.repository();
    assert_eq!(repo.list(&wolf(), lists::COMMON_NAMES).unwrap().len(), 2);
    let statuses = repo.list(&wolf(), lists::CONSERVATION_STATUSES).unwrap();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|s| s.status == "Endangered"));

    // the mapped status is findable once the index is rebuilt
    engine.rebuild_index().unwrap();
    let page = engine
        .find_all_by_status(StatusType::Conservation, &PageRequest::default())
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].guid, WOLF);
}

#[test]
fn test_facts_merge_in_triple_order() {
    let engine = engine_with(wolf_resolver());
    let triples: Vec<Triple> = std::iter::once(Triple::new("tc#hasSpecies", "Canis lupus"))
        .chain((0..5).map(|i| Triple::new("tc#hasCommonName", format!("name {i}"))))
        .collect();
    engine.ingest(&doc(), &triples).unwrap();

    let names: Vec<String> = engine
        .repository()
        .list(&wolf(), lists::COMMON_NAMES)
        .unwrap()
        .into_iter()
        .map(|c: CommonName| c.name_string)
        .collect();
    assert_eq!(names, (0..5).map(|i| format!("name {i}")).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_batches_for_one_taxon_lose_nothing() {
    let engine = Arc::new(engine_with(wolf_resolver()));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..10 {
                    engine
                        .ingest(
                            &doc(),
                            &[
                                Triple::new("tc#hasSpecies", "Canis lupus"),
                                Triple::new("tc#hasCommonName", format!("t{t}-{i}")),
                            ],
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let names = engine.repository().list(&wolf(), lists::COMMON_NAMES).unwrap();
    assert_eq!(names.len(), 40);
}

struct SlowResolver;

impl NameResolver for SlowResolver {
    fn resolve(&self, _query: &NameQuery) -> Result<Option<Guid>, ResolverError> {
        thread::sleep(Duration::from_millis(500));
        Ok(Some(wolf()))
    }
}

#[test]
fn test_slow_resolver_times_out() {
    let mut config = TaxonConfig::default();
    config.ingest.resolve_timeout = Duration::from_millis(50);
    let engine = TaxonEngine::new(
        Arc::new(InMemoryConceptStore::new()),
        Arc::new(SlowResolver),
        Arc::new(InMemoryVocabulary::new()),
        config,
    )
    .unwrap();

    let err = engine
        .ingest(&doc(), &[Triple::new("tc#hasSpecies", "Canis lupus")])
        .unwrap_err();
    assert!(matches!(
        err,
        TaxonError::Ingest(IngestError::Resolver(ResolverError::Timeout { duration_ms: 50 }))
    ));
    assert!(err.is_retryable());
    assert_eq!(engine.store().row_count().unwrap(), 0);
}

/// Store whose backend connection is down.
struct UnreachableStore;

fn unreachable() -> StorageError {
    StorageError::Unavailable {
        message: "connection refused".to_string(),
    }
}

impl ConceptStore for UnreachableStore {
    fn get(&self, _guid: &Guid, _filter: &FamilyFilter) -> Result<Option<ConceptRow>, StorageError> {
        Err(unreachable())
    }

    fn put(&self, _guid: &Guid, _family: Family, _cells: Vec<(String, String)>) -> Result<(), StorageError> {
        Err(unreachable())
    }

    fn compare_and_swap(
        &self,
        _guid: &Guid,
        _family: Family,
        _column: &str,
        _expected: Option<u64>,
        _value: String,
    ) -> Result<u64, StorageError> {
        Err(unreachable())
    }

    fn delete(&self, _guid: &Guid) -> Result<bool, StorageError> {
        Err(unreachable())
    }

    fn delete_family(&self, _family: Family) -> Result<usize, StorageError> {
        Err(unreachable())
    }

    fn scan(&self, _filter: FamilyFilter) -> Result<RowScan<'_>, StorageError> {
        Err(unreachable())
    }

    fn row_count(&self) -> Result<usize, StorageError> {
        Err(unreachable())
    }
}

#[test]
fn test_store_unavailable_propagates() {
    let engine = TaxonEngine::new(
        Arc::new(UnreachableStore),
        wolf_resolver(),
        Arc::new(InMemoryVocabulary::new()),
        TaxonConfig::default(),
    )
    .unwrap();

    let err = engine
        .ingest(&doc(), &[Triple::new("tc#hasSpecies", "Canis lupus")])
        .unwrap_err();
    assert!(err.is_store_unavailable(), "got {err:?}");

    let err = engine.rebuild_index().unwrap_err();
    assert!(err.is_store_unavailable(), "got {err:?}");

    let err = engine.get_extended(WOLF).unwrap_err();
    assert!(err.is_store_unavailable(), "got {err:?}");
}

#[test]
fn test_concept_round_trip_and_blank_guid() {
    let engine = engine_with(wolf_resolver());
    let tc = TaxonConcept::builder()
        .guid(WOLF)
        .name_string("Canis lupus")
        .author("Linnaeus")
        .author_year("1758")
        .rank_string("species")
        .info_source_id("1013")
        .build()
        .unwrap();
    engine.repository().create(&tc).unwrap();
    assert_eq!(engine.repository().get(&wolf()).unwrap(), Some(tc));

    assert!(Guid::parse("").is_err());
    assert!(engine.get_extended("").unwrap_err().is_invalid_argument());
}
