//! Persistent storage backend for the concept store.
//!
//! Durable, crash-safe storage built from:
//! - a write-ahead log, appended before every mutation is applied
//! - snapshot segments written by compaction (temp file + rename)
//! - an exclusive directory lock for single-process access
//! - CRC32-checked framing for corruption detection
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │           PersistentConceptStore           │
//! ├────────────────────────────────────────────┤
//! │  Table (RwLock) ◄── replay ── WAL          │
//! │        │                       ▲           │
//! │        └── compact ──► Segment ┘ truncate  │
//! │                 FileLock (flock)           │
//! └────────────────────────────────────────────┘
//! ```

mod codec;
mod file_lock;
mod segment;
mod store;
mod wal;

pub use file_lock::FileLock;
pub use segment::{Segment, SegmentManager};
pub use store::{CompactionResult, PersistentConceptStore};
pub use wal::{WalEntry, WalEntryKind, WriteAheadLog};

use std::path::Path;

use serde::Deserialize;

use crate::error::ValidationError;
use crate::storage::StorageError;

/// Configuration for persistent storage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistentConfig {
    /// Log size that triggers automatic compaction (bytes).
    pub max_wal_size: u64,
    /// Whether to fsync after every write (slower but safer).
    pub sync_on_write: bool,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            max_wal_size: 64 * 1024 * 1024,
            sync_on_write: true,
        }
    }
}

impl PersistentConfig {
    /// Smaller logs would compact on almost every write.
    const MIN_WAL_SIZE: u64 = 4 * 1024;

    /// Validates the configuration.
    ///
    /// # Errors
    /// `ValidationError::InvalidConfig` if `max_wal_size` is below 4 KiB.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.max_wal_size < Self::MIN_WAL_SIZE {
            return Err(ValidationError::InvalidConfig {
                reason: format!(
                    "persistent.max_wal_size must be at least {} bytes (got {})",
                    Self::MIN_WAL_SIZE,
                    self.max_wal_size
                ),
            });
        }
        Ok(self)
    }
}

/// Opens or creates a persistent concept store at `path`.
///
/// # Errors
/// - `StorageError::InvalidArgument` if the configuration is invalid
/// - `StorageError::Unavailable` if another process holds the lock
/// - `StorageError::Backend` if WAL replay fails
///
/// # Example
/// ```rust,ignore
/// use taxonstore::storage::persistent::open_concept_store;
///
/// let store = open_concept_store("./taxa.db", None)?;
/// ```
pub fn open_concept_store(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> Result<PersistentConceptStore, StorageError> {
    let config = config.unwrap_or_default().validate()?;
    PersistentConceptStore::open(path.as_ref(), config)
}
