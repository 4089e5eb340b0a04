//! In-memory storage backend.
//!
//! Thread-safe in-memory implementation of [`ConceptStore`]. It is intended
//! for embedded usage, tests, and as a reference implementation.

use std::sync::{Arc, RwLock};

use crate::guid::Guid;
use crate::storage::table::{lock_err, scan_table, Table};
use crate::storage::traits::{ConceptRow, ConceptStore, Family, FamilyFilter, RowScan, StorageError};

/// In-memory concept store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryConceptStore {
    table: Arc<RwLock<Table>>,
}

impl InMemoryConceptStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConceptStore for InMemoryConceptStore {
    fn get(&self, guid: &Guid, filter: &FamilyFilter) -> Result<Option<ConceptRow>, StorageError> {
        let table = self.table.read().map_err(|_| lock_err("concept.get"))?;
        Ok(table.get(guid.as_str(), filter))
    }

    fn put(
        &self,
        guid: &Guid,
        family: Family,
        cells: Vec<(String, String)>,
    ) -> Result<(), StorageError> {
        let mut table = self.table.write().map_err(|_| lock_err("concept.put"))?;
        table.put(guid.as_str(), family, cells);
        Ok(())
    }

    fn compare_and_swap(
        &self,
        guid: &Guid,
        family: Family,
        column: &str,
        expected: Option<u64>,
        value: String,
    ) -> Result<u64, StorageError> {
        let mut table = self.table.write().map_err(|_| lock_err("concept.cas"))?;
        table.check_revision(guid.as_str(), family, column, expected)?;
        table.put(guid.as_str(), family, vec![(column.to_string(), value)]);
        Ok(table.revision())
    }

    fn delete(&self, guid: &Guid) -> Result<bool, StorageError> {
        let mut table = self.table.write().map_err(|_| lock_err("concept.delete"))?;
        Ok(table.delete(guid.as_str()))
    }

    fn delete_family(&self, family: Family) -> Result<usize, StorageError> {
        let mut table = self
            .table
            .write()
            .map_err(|_| lock_err("concept.delete_family"))?;
        Ok(table.delete_family(family))
    }

    fn scan(&self, filter: FamilyFilter) -> Result<RowScan<'_>, StorageError> {
        Ok(scan_table(Arc::clone(&self.table), filter))
    }

    fn row_count(&self) -> Result<usize, StorageError> {
        let table = self.table.read().map_err(|_| lock_err("concept.row_count"))?;
        Ok(table.len())
    }
}
