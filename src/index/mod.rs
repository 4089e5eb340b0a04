//! Search index: schema, document construction, rebuild and generations.
//!
//! The index is a disposable derivative of the concept store. It is only
//! ever produced by a full rebuild into a new generation, which replaces the
//! live generation once committed.

mod builder;
mod document;
mod generation;
pub mod names;
pub mod schema;

pub use builder::{IndexBuilder, RebuildReport};
pub use document::{build_documents, ConceptDocuments, ConceptRecord, DocType, TaxonDocument};
pub use generation::{IndexGeneration, IndexHandle};
