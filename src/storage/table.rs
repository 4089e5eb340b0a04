//! Row table shared by the in-memory and persistent backends.
//!
//! The table owns the store-wide revision counter. Applying the same
//! sequence of mutations to an empty table always yields the same
//! revisions, which is what lets the persistent backend rebuild state by
//! replaying its log.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::traits::{Cell, ConceptRow, Family, FamilyFilter, RowScan, StorageError};

pub(crate) fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

type Columns = BTreeMap<String, Cell>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Table {
    rows: BTreeMap<String, BTreeMap<Family, Columns>>,
    revision: u64,
}

impl Table {
    fn project(guid: &str, families: &BTreeMap<Family, Columns>, filter: &FamilyFilter) -> Option<ConceptRow> {
        let selected: BTreeMap<Family, Columns> = families
            .iter()
            .filter(|(family, cols)| filter.includes(**family) && !cols.is_empty())
            .map(|(family, cols)| (*family, cols.clone()))
            .collect();
        if selected.is_empty() {
            return None;
        }
        Some(ConceptRow {
            guid: guid.to_string(),
            families: selected,
        })
    }

    pub(crate) fn get(&self, guid: &str, filter: &FamilyFilter) -> Option<ConceptRow> {
        self.rows
            .get(guid)
            .and_then(|families| Self::project(guid, families, filter))
    }

    pub(crate) fn put(&mut self, guid: &str, family: Family, cells: Vec<(String, String)>) {
        if cells.is_empty() {
            return;
        }
        let cols = self
            .rows
            .entry(guid.to_string())
            .or_default()
            .entry(family)
            .or_default();
        for (column, value) in cells {
            self.revision += 1;
            cols.insert(
                column,
                Cell {
                    value,
                    revision: self.revision,
                },
            );
        }
    }

    pub(crate) fn current_revision(&self, guid: &str, family: Family, column: &str) -> Option<u64> {
        self.rows
            .get(guid)
            .and_then(|families| families.get(&family))
            .and_then(|cols| cols.get(column))
            .map(|cell| cell.revision)
    }

    /// Fails with `RevisionConflict` unless the cell is at `expected`.
    pub(crate) fn check_revision(
        &self,
        guid: &str,
        family: Family,
        column: &str,
        expected: Option<u64>,
    ) -> Result<(), StorageError> {
        let actual = self.current_revision(guid, family, column);
        if actual == expected {
            Ok(())
        } else {
            Err(StorageError::RevisionConflict {
                guid: guid.to_string(),
                column: column.to_string(),
                expected,
                actual,
            })
        }
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn delete(&mut self, guid: &str) -> bool {
        self.rows.remove(guid).is_some()
    }

    pub(crate) fn delete_family(&mut self, family: Family) -> usize {
        let mut touched = 0;
        for families in self.rows.values_mut() {
            if families.remove(&family).is_some_and(|cols| !cols.is_empty()) {
                touched += 1;
            }
        }
        self.rows.retain(|_, families| families.values().any(|cols| !cols.is_empty()));
        touched
    }

    pub(crate) fn rows_with_family(&self, family: Family) -> usize {
        self.rows
            .values()
            .filter(|families| families.get(&family).is_some_and(|cols| !cols.is_empty()))
            .count()
    }

    /// First row strictly after `cursor` with cells in the filtered families.
    fn next_after(&self, cursor: Option<&str>, filter: &FamilyFilter) -> Option<ConceptRow> {
        let lower = cursor.map_or(Bound::Unbounded, Bound::Excluded);
        self.rows
            .range::<str, _>((lower, Bound::Unbounded))
            .find_map(|(guid, families)| Self::project(guid, families, filter))
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Cursor-based scan that re-acquires the read lock for each row so that
/// writers are never blocked for the length of a full scan.
pub(crate) fn scan_table(table: Arc<RwLock<Table>>, filter: FamilyFilter) -> RowScan<'static> {
    let mut cursor: Option<String> = None;
    let mut done = false;
    Box::new(std::iter::from_fn(move || {
        if done {
            return None;
        }
        let next = match table.read() {
            Ok(guard) => guard.next_after(cursor.as_deref(), &filter),
            Err(_) => {
                done = true;
                return Some(Err(lock_err("table.scan")));
            }
        };
        match next {
            Some(row) => {
                cursor = Some(row.guid.clone());
                Some(Ok(row))
            }
            None => {
                done = true;
                None
            }
        }
    }))
}
