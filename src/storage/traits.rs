//! Abstract storage traits for the concept store.
//!
//! A concept row is keyed by GUID and split into column families. Every
//! cell carries a revision so that read-modify-write list updates can be
//! made safe with compare-and-swap instead of blind overwrites.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ValidationError;
use crate::guid::Guid;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Caller supplied an invalid key or value.
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the input.
        reason: String,
    },

    /// The backing store could not be reached or opened.
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Underlying connection or lock failure.
        message: String,
    },

    /// A compare-and-swap saw a different revision than expected.
    #[error("Revision conflict on {guid}/{column}: expected {expected:?}, found {actual:?}")]
    RevisionConflict {
        /// Row key.
        guid: String,
        /// Column name.
        column: String,
        /// Revision the caller read.
        expected: Option<u64>,
        /// Revision currently stored.
        actual: Option<u64>,
    },

    /// A list update kept losing compare-and-swap races.
    #[error("Gave up updating {guid}/{column} after {attempts} attempts")]
    Contention {
        /// Row key.
        guid: String,
        /// Column name.
        column: String,
        /// Attempts made.
        attempts: usize,
    },

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Returns true for failures a caller may reasonably retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Contention { .. } | Self::RevisionConflict { .. }
        )
    }
}

impl From<ValidationError> for StorageError {
    fn from(e: ValidationError) -> Self {
        Self::InvalidArgument {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Column families of a concept row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Family {
    /// Core concept facts and every relation/attribute list.
    #[serde(rename = "tc")]
    Core,
    /// Nomenclatural detail (`TaxonName`).
    #[serde(rename = "tn")]
    Name,
    /// Raw, per-source provenance cells.
    #[serde(rename = "raw")]
    Raw,
}

impl Family {
    /// All families in storage order.
    pub const ALL: [Self; 3] = [Self::Core, Self::Name, Self::Raw];

    /// Short column-family prefix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Core => "tc",
            Self::Name => "tn",
            Self::Raw => "raw",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which families a read should return.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FamilyFilter {
    /// Every family.
    #[default]
    All,
    /// Only the listed families.
    Only(Vec<Family>),
}

impl FamilyFilter {
    /// Filter selecting a single family.
    #[must_use]
    pub fn only(family: Family) -> Self {
        Self::Only(vec![family])
    }

    /// Returns true if `family` passes the filter.
    #[must_use]
    pub fn includes(&self, family: Family) -> bool {
        match self {
            Self::All => true,
            Self::Only(families) => families.contains(&family),
        }
    }
}

/// A single stored value with its write revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Serialized value (plain text or a JSON list).
    pub value: String,
    /// Store-wide monotonically increasing revision of the last write.
    pub revision: u64,
}

/// One concept row as returned by a read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptRow {
    /// Row key.
    pub guid: String,
    /// Column family -> column -> cell.
    pub families: BTreeMap<Family, BTreeMap<String, Cell>>,
}

impl ConceptRow {
    /// Returns a cell if present.
    #[must_use]
    pub fn cell(&self, family: Family, column: &str) -> Option<&Cell> {
        self.families.get(&family).and_then(|cols| cols.get(column))
    }

    /// Returns the value of a cell if present.
    #[must_use]
    pub fn value(&self, family: Family, column: &str) -> Option<&str> {
        self.cell(family, column).map(|c| c.value.as_str())
    }

    /// Returns the revision of a cell if present.
    #[must_use]
    pub fn revision(&self, family: Family, column: &str) -> Option<u64> {
        self.cell(family, column).map(|c| c.revision)
    }

    /// Returns true if the row carries no cells for `family`.
    #[must_use]
    pub fn family_is_empty(&self, family: Family) -> bool {
        self.families.get(&family).map_or(true, BTreeMap::is_empty)
    }
}

/// Lazy sequence of rows produced by [`ConceptStore::scan`].
pub type RowScan<'a> = Box<dyn Iterator<Item = Result<ConceptRow, StorageError>> + Send + 'a>;

/// Storage trait for concept rows.
///
/// # Concurrency
/// Reads and writes to independent GUIDs may run concurrently. Writes that
/// read a list and write it back must go through [`ConceptStore::compare_and_swap`]
/// so that concurrent appenders to the same GUID cannot lose updates.
pub trait ConceptStore: Send + Sync {
    /// Reads a row, restricted to the families in `filter`.
    ///
    /// Returns `Ok(None)` if the row does not exist or has no cells in the
    /// selected families.
    fn get(&self, guid: &Guid, filter: &FamilyFilter) -> Result<Option<ConceptRow>, StorageError>;

    /// Writes the given columns of one family, creating the row if needed.
    fn put(&self, guid: &Guid, family: Family, cells: Vec<(String, String)>)
        -> Result<(), StorageError>;

    /// Writes one cell only if its revision still equals `expected`
    /// (`None` means the cell must not exist yet). Returns the new revision.
    ///
    /// # Errors
    /// `StorageError::RevisionConflict` if another writer got there first.
    fn compare_and_swap(
        &self,
        guid: &Guid,
        family: Family,
        column: &str,
        expected: Option<u64>,
        value: String,
    ) -> Result<u64, StorageError>;

    /// Deletes a whole row. Returns true if it existed.
    fn delete(&self, guid: &Guid) -> Result<bool, StorageError>;

    /// Removes one family from every row. Returns the number of rows touched.
    fn delete_family(&self, family: Family) -> Result<usize, StorageError>;

    /// Lazily iterates rows in key order.
    ///
    /// Each call starts from the first key. The sequence is not a snapshot:
    /// rows written or deleted while scanning may or may not be observed.
    fn scan(&self, filter: FamilyFilter) -> Result<RowScan<'_>, StorageError>;

    /// Number of rows currently stored.
    fn row_count(&self) -> Result<usize, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_filter() {
        assert!(FamilyFilter::All.includes(Family::Raw));
        let only = FamilyFilter::only(Family::Core);
        assert!(only.includes(Family::Core));
        assert!(!only.includes(Family::Name));
    }

    #[test]
    fn test_family_serializes_as_prefix() {
        let json = serde_json::to_string(&Family::Name).unwrap();
        assert_eq!(json, "\"tn\"");
        assert_eq!(Family::Raw.to_string(), "raw");
    }

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::Unavailable {
            message: "down".into()
        }
        .is_transient());
        assert!(!StorageError::Backend("x".into()).is_transient());
        assert!(!StorageError::from(ValidationError::InvalidGuid).is_transient());
    }
}
