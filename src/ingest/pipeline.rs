//! The ingestion state machine: classify, resolve, merge.
//!
//! Classification and resolution are all-or-nothing: if the batch cannot be
//! pinned to one concept nothing is written. Merging is best-effort per
//! triple; a blank triple is skipped and the rest of the batch continues.
//! Store and resolver failures always propagate.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::concept::TaxonConcept;
use crate::error::IngestError;
use crate::facts::{CommonName, Image, SimpleProperty, StatusFact};
use crate::guid::Guid;
use crate::ingest::mime::{image_extension, image_location};
use crate::ingest::predicate::{Hierarchy, Predicate};
use crate::ingest::triple::{SourceDocument, Triple};
use crate::rank::Rank;
use crate::repository::{lists, ConceptRepository};
use crate::resolver::{NameQuery, NameResolver};
use crate::vocabulary::{StatusType, Vocabulary};

/// Outcome of one successfully merged batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Batch identifier, also present on every log line of the batch.
    pub batch_id: Uuid,
    /// Concept the facts were merged into.
    pub guid: Guid,
    /// Name that resolved.
    pub name: String,
    /// Rank the name was resolved at, if one was synthesised.
    pub rank: Option<Rank>,
    /// Resolver calls made.
    pub attempts: usize,
    /// Facts appended (including the image).
    pub facts_written: usize,
    /// Blank triples skipped.
    pub skipped: usize,
    /// Repository location of the image, for image documents.
    pub image: Option<String>,
    /// Whether the concept row had to be created.
    pub created_concept: bool,
}

/// Merges triple batches into the concept store.
pub struct IngestionPipeline {
    repository: ConceptRepository,
    resolver: Arc<dyn NameResolver>,
    vocabulary: Arc<dyn Vocabulary>,
}

impl std::fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

struct Resolved {
    guid: Guid,
    query: NameQuery,
    attempts: usize,
}

impl IngestionPipeline {
    /// Creates a pipeline. The resolver should already enforce a timeout.
    #[must_use]
    pub fn new(
        repository: ConceptRepository,
        resolver: Arc<dyn NameResolver>,
        vocabulary: Arc<dyn Vocabulary>,
    ) -> Self {
        Self {
            repository,
            resolver,
            vocabulary,
        }
    }

    /// Ingests one document's triples.
    ///
    /// # Errors
    /// - `IngestError::InsufficientData` if the batch has no usable hierarchy
    /// - `IngestError::NameNotResolved` if every candidate name failed
    /// - `IngestError::Resolver` / `IngestError::Storage` on collaborator failure
    pub fn ingest(
        &self,
        document: &SourceDocument,
        triples: &[Triple],
    ) -> Result<IngestReport, IngestError> {
        let batch_id = Uuid::new_v4();
        let span = info_span!("ingest", %batch_id, file_path = %document.file_path);
        let _entered = span.enter();

        let hierarchy = Hierarchy::from_triples(triples);
        if !hierarchy.has_identifying_rank() {
            warn!("no classification found in document");
            return Err(IngestError::InsufficientData {
                file_path: document.file_path.clone(),
            });
        }
        let candidates = hierarchy.candidates();
        if candidates.is_empty() {
            warn!("not enough classification to build a name");
            return Err(IngestError::InsufficientData {
                file_path: document.file_path.clone(),
            });
        }

        let resolved = self.resolve(&candidates)?;
        let guid = resolved.guid;
        debug!(guid = %guid, name = %resolved.query.scientific_name, "name resolved");

        let created_concept = self.ensure_concept(&guid, &resolved.query, document)?;

        let literals: Vec<(String, String)> = triples
            .iter()
            .filter(|t| !t.is_blank())
            .map(|t| (t.predicate.clone(), t.object.clone()))
            .collect();
        if !literals.is_empty() {
            self.repository.add_literal_values(
                &guid,
                &document.info_source_id,
                &document.document_id,
                &literals,
            )?;
        }

        let mut facts_written = 0;
        let mut skipped = 0;
        for (position, triple) in triples.iter().enumerate() {
            if triple.is_blank() {
                warn!(position, predicate = %triple.predicate, "skipping blank triple");
                skipped += 1;
                continue;
            }
            if self.merge(&guid, document, triple)? {
                facts_written += 1;
            }
        }

        let image = self.merge_image(&guid, document)?;
        if image.is_some() {
            facts_written += 1;
        }

        info!(
            guid = %guid,
            facts = facts_written,
            skipped,
            attempts = resolved.attempts,
            "ingested document"
        );
        Ok(IngestReport {
            batch_id,
            guid,
            name: resolved.query.scientific_name,
            rank: resolved.query.rank,
            attempts: resolved.attempts,
            facts_written,
            skipped,
            image,
            created_concept,
        })
    }

    fn resolve(&self, candidates: &[NameQuery]) -> Result<Resolved, IngestError> {
        for (i, query) in candidates.iter().enumerate() {
            if let Some(guid) = self.resolver.resolve(query)? {
                return Ok(Resolved {
                    guid,
                    query: query.clone(),
                    attempts: i + 1,
                });
            }
            debug!(name = %query.scientific_name, rank = ?query.rank, "name not resolved");
        }
        let name = candidates
            .first()
            .map(|q| q.scientific_name.clone())
            .unwrap_or_default();
        warn!(name = %name, attempts = candidates.len(), "unable to resolve name, dropping batch");
        Err(IngestError::NameNotResolved {
            name,
            attempts: candidates.len(),
        })
    }

    /// Creates a minimal concept row when the resolved GUID has none.
    fn ensure_concept(
        &self,
        guid: &Guid,
        query: &NameQuery,
        document: &SourceDocument,
    ) -> Result<bool, IngestError> {
        if self.repository.exists(guid)? {
            return Ok(false);
        }
        let concept = TaxonConcept {
            guid: guid.clone(),
            name_string: Some(query.scientific_name.clone()),
            author: None,
            author_year: None,
            rank_string: query.rank.map(|r| r.name().to_string()),
            published_in: None,
            published_in_citation: None,
            accepted_concept_guid: None,
            parent_guid: None,
            info_source_id: Some(document.info_source_id.clone()),
            info_source_name: document.info_source_name.clone(),
            info_source_url: document.info_source_url.clone(),
        };
        self.repository.create(&concept)?;
        info!(guid = %guid, "created concept for resolved name");
        Ok(true)
    }

    /// Maps one triple to a stored fact. Returns whether a fact was written.
    fn merge(
        &self,
        guid: &Guid,
        document: &SourceDocument,
        triple: &Triple,
    ) -> Result<bool, IngestError> {
        let object = triple.object.trim();
        match Predicate::parse(&triple.predicate) {
            Predicate::CommonName => {
                let name = CommonName::new(object, document.name_provenance());
                self.repository.append(guid, lists::COMMON_NAMES, name)?;
            }
            Predicate::ConservationStatus => {
                let fact = self.status_fact(document, StatusType::Conservation, object);
                self.repository.append(guid, lists::CONSERVATION_STATUSES, fact)?;
            }
            Predicate::PestStatus => {
                let fact = self.status_fact(document, StatusType::Pest, object);
                self.repository.append(guid, lists::PEST_STATUSES, fact)?;
            }
            Predicate::ImagePageUrl => return Ok(false),
            _ => {
                let property = SimpleProperty {
                    name: triple.predicate.trim().to_string(),
                    value: object.to_string(),
                    provenance: document.provenance(),
                };
                self.repository.append(guid, lists::TEXT_PROPERTIES, property)?;
            }
        }
        Ok(true)
    }

    fn status_fact(&self, document: &SourceDocument, status: StatusType, raw: &str) -> StatusFact {
        let provenance = document.name_provenance();
        match self
            .vocabulary
            .map_status(&document.info_source_id, status, raw)
        {
            Some(term) if term != raw => StatusFact {
                status: term,
                raw_status: Some(raw.to_string()),
                provenance,
            },
            Some(_) => StatusFact::new(raw, provenance),
            None => {
                debug!(status = %status, raw, "no vocabulary mapping, storing raw status");
                StatusFact::new(raw, provenance)
            }
        }
    }

    fn merge_image(
        &self,
        guid: &Guid,
        document: &SourceDocument,
    ) -> Result<Option<String>, IngestError> {
        let Some(content_type) = document.mime_type.as_deref() else {
            return Ok(None);
        };
        let Some(extension) = image_extension(content_type) else {
            return Ok(None);
        };
        let image = Image {
            repo_location: image_location(&document.file_path, extension),
            content_type: content_type.trim().to_string(),
            provenance: document.provenance(),
        };
        let location = image.repo_location.clone();
        self.repository.append(guid, lists::IMAGES, image)?;
        Ok(Some(location))
    }
}
