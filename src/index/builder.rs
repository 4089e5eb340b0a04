//! Full index rebuild from a concept store scan.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tantivy::IndexWriter;
use tracing::{debug, info, info_span, warn};

use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::index::document::{build_documents, ConceptRecord, TaxonDocument};
use crate::index::generation::IndexHandle;
use crate::storage::{ConceptStore, Family, FamilyFilter};
use crate::vocabulary::Vocabulary;

/// Records between progress log lines.
const PROGRESS_INTERVAL: usize = 100;

/// Outcome of a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    /// Generation now being served.
    pub generation: u64,
    /// Rows read from the store.
    pub scanned: usize,
    /// Primary documents written.
    pub primary_documents: usize,
    /// Synonym documents written.
    pub synonym_documents: usize,
    /// Rows without a scientific name.
    pub skipped: usize,
    /// Intermediate and final commits.
    pub commits: usize,
    /// Wall time.
    pub elapsed_ms: u64,
    /// Hash over the primary documents, independent of scan order.
    pub fingerprint: String,
}

/// Builds index generations from the concept store.
pub struct IndexBuilder {
    config: IndexConfig,
    vocabulary: Arc<dyn Vocabulary>,
}

impl std::fmt::Debug for IndexBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl IndexBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(config: IndexConfig, vocabulary: Arc<dyn Vocabulary>) -> Self {
        Self { config, vocabulary }
    }

    /// Scans the whole store into a new generation and swaps it in.
    ///
    /// The previous generation keeps serving until the new one is complete;
    /// on any error the new generation is discarded.
    ///
    /// # Errors
    /// - `IndexError::RebuildInProgress` if a rebuild is already running
    /// - `IndexError::Storage` if the scan fails
    /// - `IndexError::Engine` / `IndexError::Io` for index write failures
    pub fn rebuild(
        &self,
        store: &dyn ConceptStore,
        handle: &IndexHandle,
    ) -> Result<RebuildReport, IndexError> {
        let pending = handle.begin()?;
        let generation = pending.id();
        let span = info_span!("rebuild", generation);
        let _entered = span.enter();
        let started = Instant::now();

        let fields = *pending.fields();
        let mut writer: IndexWriter = pending.index()?.writer(self.config.writer_heap_bytes)?;
        let commit_interval = self.config.commit_interval.max(1);

        let mut report = RebuildReport {
            generation,
            scanned: 0,
            primary_documents: 0,
            synonym_documents: 0,
            skipped: 0,
            commits: 0,
            elapsed_ms: 0,
            fingerprint: String::new(),
        };
        let mut hashes: Vec<[u8; 32]> = Vec::new();

        for row in store.scan(FamilyFilter::only(Family::Core))? {
            let row = row?;
            report.scanned += 1;
            let record = ConceptRecord::from_row(&row)?;
            let docs = build_documents(&record, self.vocabulary.as_ref());

            match docs.primary {
                Some(primary) => {
                    hashes.push(document_hash(&primary)?);
                    writer.add_document(fields.to_tantivy(&primary))?;
                    report.primary_documents += 1;
                    for synonym in &docs.synonyms {
                        writer.add_document(fields.to_tantivy(synonym))?;
                        report.synonym_documents += 1;
                    }
                }
                None => {
                    debug!(guid = %row.guid, "skipping concept without a scientific name");
                    report.skipped += 1;
                }
            }

            if report.scanned % PROGRESS_INTERVAL == 0 {
                debug!(scanned = report.scanned, "rebuild progress");
            }
            if report.scanned % commit_interval == 0 {
                writer.commit()?;
                report.commits += 1;
            }
        }

        writer.commit()?;
        report.commits += 1;
        writer.wait_merging_threads()?;

        hashes.sort_unstable();
        let mut hasher = blake3::Hasher::new();
        for h in &hashes {
            hasher.update(h);
        }
        report.fingerprint = hasher.finalize().to_hex().to_string();

        pending.publish()?;
        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if report.skipped > 0 {
            warn!(skipped = report.skipped, "concepts without a scientific name were not indexed");
        }
        info!(
            scanned = report.scanned,
            primary = report.primary_documents,
            synonyms = report.synonym_documents,
            elapsed_ms = report.elapsed_ms,
            "index rebuild complete"
        );
        Ok(report)
    }
}

fn document_hash(doc: &TaxonDocument) -> Result<[u8; 32], IndexError> {
    let bytes = serde_json::to_vec(doc).map_err(|e| IndexError::Engine {
        message: format!("failed to encode document {}: {e}", doc.guid),
    })?;
    Ok(*blake3::hash(&bytes).as_bytes())
}
