//! Triple ingestion: classification, name resolution and fact merging.

mod mime;
mod pipeline;
mod predicate;
mod triple;

pub use mime::{image_extension, image_location};
pub use pipeline::{IngestReport, IngestionPipeline};
pub use predicate::{Hierarchy, Predicate};
pub use triple::{SourceDocument, Triple};
