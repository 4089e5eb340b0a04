//! Concept store: trait, in-memory backend and the optional persistent backend.

mod memory;
pub(crate) mod table;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::InMemoryConceptStore;
pub use traits::{
    Cell, ConceptRow, ConceptStore, Family, FamilyFilter, RowScan, StorageError,
};
