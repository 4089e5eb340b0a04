//! Worker runtime: batches ingested concurrently, then indexed and queried.

use std::sync::Arc;
use std::time::Duration;

use taxonstore::guid::Guid;
use taxonstore::repository::lists;
use taxonstore::{
    InMemoryNameResolver, InMemoryVocabulary, PageRequest, Rank, RuntimeConfig, SourceDocument,
    TaxonEngine, TaxonRuntime, Triple, WorkerPoolKind,
};

const SPECIES: [&str; 3] = ["Canis lupus", "Vulpes vulpes", "Felis catus"];

fn guid_for(name: &str) -> Guid {
    Guid::parse(&format!("urn:taxon:{}", name.replace(' ', "-").to_lowercase())).unwrap()
}

fn runtime() -> TaxonRuntime {
    let resolver = SPECIES.iter().fold(InMemoryNameResolver::new(), |r, name| {
        r.with_name(name, Some(Rank::Species), guid_for(name))
    });
    let engine = TaxonEngine::in_memory(Arc::new(resolver), Arc::new(InMemoryVocabulary::new())).unwrap();
    let config = RuntimeConfig {
        ingest_workers: 4,
        queue_capacity: 64,
        ..RuntimeConfig::default()
    };
    TaxonRuntime::with_config(engine, &config).unwrap()
}

#[test]
fn test_concurrent_ingest_then_rebuild_and_query() {
    let runtime = runtime();

    let handles: Vec<_> = (0..30)
        .map(|i| {
            let species = SPECIES[i % SPECIES.len()];
            let doc = SourceDocument::new(format!("/data/7/{i}"), "7", i.to_string());
            runtime
                .ingest_async(
                    doc,
                    vec![
                        Triple::new("tc#hasSpecies", species),
                        Triple::new("tc#hasCommonName", format!("name {i}")),
                    ],
                )
                .unwrap()
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.pool(), WorkerPoolKind::Ingest);
        handle.join_timeout(Duration::from_secs(10)).unwrap();
    }

    for species in SPECIES {
        let names = runtime
            .engine()
            .repository()
            .list(&guid_for(species), lists::COMMON_NAMES)
            .unwrap();
        assert_eq!(names.len(), 10, "{species}");
    }

    let rebuild = runtime.rebuild_async().unwrap();
    assert_eq!(rebuild.pool(), WorkerPoolKind::Index);
    let report = rebuild.join_timeout(Duration::from_secs(30)).unwrap();
    assert_eq!(report.primary_documents, 3);

    let page = runtime
        .engine()
        .search_by_name(Some("name 17"), &PageRequest::default())
        .unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.items[0].guid, guid_for(SPECIES[17 % 3]).as_str());
}

#[test]
fn test_failed_batch_reports_through_handle() {
    let runtime = runtime();
    let err = runtime
        .ingest(
            SourceDocument::new("/data/7/x", "7", "x"),
            vec![Triple::new("tc#hasSpecies", "Panthera leo")],
        )
        .unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(runtime.engine().store().row_count().unwrap(), 0);
}
