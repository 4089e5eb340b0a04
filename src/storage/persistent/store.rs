//! WAL-backed concept store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};

use crate::guid::Guid;
use crate::storage::table::{lock_err, scan_table, Table};
use crate::storage::traits::{ConceptRow, ConceptStore, Family, FamilyFilter, RowScan, StorageError};

use super::file_lock::FileLock;
use super::segment::SegmentManager;
use super::wal::{WalEntryKind, WriteAheadLog};
use super::PersistentConfig;

const WAL_FILE: &str = "concepts.wal";
const SEGMENT_DIR: &str = "segments";

fn io_err(context: &str) -> impl Fn(std::io::Error) -> StorageError + '_ {
    move |e| StorageError::Backend(format!("{context}: {e}"))
}

/// Result of a compaction.
#[derive(Debug, Clone)]
pub struct CompactionResult {
    /// Rows captured in the snapshot.
    pub rows: usize,
    /// Log entries folded into the snapshot.
    pub entries_compacted: u64,
    /// New segment file, if one was written.
    pub segment_path: Option<PathBuf>,
    /// Log size before compaction.
    pub wal_size_before: u64,
    /// Log size after compaction.
    pub wal_size_after: u64,
}

/// Durable [`ConceptStore`]: an in-memory table rebuilt on open from the
/// newest snapshot segment plus the write-ahead log.
pub struct PersistentConceptStore {
    dir: PathBuf,
    _lock: FileLock,
    wal: WriteAheadLog,
    segments: Mutex<SegmentManager>,
    table: Arc<RwLock<Table>>,
    config: PersistentConfig,
}

impl std::fmt::Debug for PersistentConceptStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentConceptStore")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PersistentConceptStore {
    /// Opens or creates a store directory.
    ///
    /// # Errors
    /// - `StorageError::Unavailable` if the directory cannot be created or
    ///   another process holds the lock
    /// - `StorageError::Backend` if the log or snapshot cannot be read
    pub fn open(dir: &Path, config: PersistentConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|e| StorageError::Unavailable {
            message: format!("failed to create store directory {}: {e}", dir.display()),
        })?;
        let lock = FileLock::acquire(dir).map_err(|e| StorageError::Unavailable {
            message: format!("failed to acquire lock on {}: {e}", dir.display()),
        })?;

        let wal = WriteAheadLog::open(&dir.join(WAL_FILE), config.sync_on_write)
            .map_err(io_err("failed to open WAL"))?;
        let segments =
            SegmentManager::open(&dir.join(SEGMENT_DIR)).map_err(io_err("failed to open segments"))?;
        let table = segments
            .load_latest()
            .map_err(io_err("failed to load snapshot"))?
            .unwrap_or_default();

        let store = Self {
            dir: dir.to_path_buf(),
            _lock: lock,
            wal,
            segments: Mutex::new(segments),
            table: Arc::new(RwLock::new(table)),
            config,
        };
        store.replay_wal()?;
        Ok(store)
    }

    /// Store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn replay_wal(&self) -> Result<(), StorageError> {
        let mut table = self.table.write().map_err(|_| lock_err("persistent.replay"))?;
        let mut count = 0u64;
        for entry in self.wal.iter().map_err(io_err("failed to iterate WAL"))? {
            let entry = entry.map_err(io_err("corrupted WAL entry"))?;
            apply(&mut table, entry.kind);
            count += 1;
        }
        if count > 0 {
            info!(entries = count, rows = table.len(), "replayed concept WAL");
        }
        Ok(())
    }

    /// Logs then applies a mutation while the table write lock is held, so
    /// log order always equals apply order.
    fn log_and_apply(&self, table: &mut Table, kind: WalEntryKind) -> Result<(), StorageError> {
        self.wal
            .append(kind.clone())
            .map_err(io_err("WAL write failed"))?;
        apply(table, kind);
        Ok(())
    }

    fn maybe_compact(&self) {
        let size = self.wal.size_bytes().unwrap_or(0);
        if size < self.config.max_wal_size {
            return;
        }
        debug!(wal_size = size, "WAL over threshold, compacting");
        if let Err(e) = self.compact() {
            warn!(error = %e, "automatic compaction failed; WAL retained");
        }
    }

    /// Folds the log into a new snapshot segment and truncates the log.
    ///
    /// Safe to call at any time: if it fails partway, the log still holds
    /// every mutation and is replayed on the next open.
    pub fn compact(&self) -> Result<CompactionResult, StorageError> {
        let table = self.table.write().map_err(|_| lock_err("persistent.compact"))?;
        let entries = self
            .wal
            .current_sequence()
            .map_err(io_err("failed to read WAL sequence"))?;
        let wal_size_before = self.wal.size_bytes().unwrap_or(0);
        if entries == 0 {
            return Ok(CompactionResult {
                rows: table.len(),
                entries_compacted: 0,
                segment_path: None,
                wal_size_before,
                wal_size_after: wal_size_before,
            });
        }

        let segment_path = {
            let mut segments = self
                .segments
                .lock()
                .map_err(|_| lock_err("persistent.segments"))?;
            segments
                .write_snapshot(&table)
                .map_err(io_err("failed to write snapshot"))?
                .path()
                .to_path_buf()
        };

        self.wal
            .append(WalEntryKind::Checkpoint {
                up_to_sequence: entries,
            })
            .map_err(io_err("failed to write checkpoint"))?;
        self.wal.truncate().map_err(io_err("failed to truncate WAL"))?;
        // Keep the lock until the log is empty so no write slips between
        // the snapshot and the truncation.
        let rows = table.len();
        drop(table);

        let wal_size_after = self.wal.size_bytes().unwrap_or(0);
        info!(rows, entries, segment = %segment_path.display(), "compacted concept WAL");
        Ok(CompactionResult {
            rows,
            entries_compacted: entries,
            segment_path: Some(segment_path),
            wal_size_before,
            wal_size_after,
        })
    }

    /// Current log size in bytes.
    #[must_use]
    pub fn wal_size(&self) -> u64 {
        self.wal.size_bytes().unwrap_or(0)
    }
}

fn apply(table: &mut Table, kind: WalEntryKind) {
    match kind {
        WalEntryKind::Put {
            guid,
            family,
            cells,
        } => table.put(&guid, family, cells),
        WalEntryKind::Delete { guid } => {
            table.delete(&guid);
        }
        WalEntryKind::DeleteFamily { family } => {
            table.delete_family(family);
        }
        WalEntryKind::Checkpoint { .. } => {}
    }
}

impl ConceptStore for PersistentConceptStore {
    fn get(&self, guid: &Guid, filter: &FamilyFilter) -> Result<Option<ConceptRow>, StorageError> {
        let table = self.table.read().map_err(|_| lock_err("persistent.get"))?;
        Ok(table.get(guid.as_str(), filter))
    }

    fn put(
        &self,
        guid: &Guid,
        family: Family,
        cells: Vec<(String, String)>,
    ) -> Result<(), StorageError> {
        if cells.is_empty() {
            return Ok(());
        }
        {
            let mut table = self.table.write().map_err(|_| lock_err("persistent.put"))?;
            self.log_and_apply(
                &mut table,
                WalEntryKind::Put {
                    guid: guid.as_str().to_string(),
                    family,
                    cells,
                },
            )?;
        }
        self.maybe_compact();
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
        let revision = {
            let mut table = self.table.write().map_err(|_| lock_err("persistent.cas"))?;
            table.check_revision(guid.as_str(), family, column, expected)?;
            self.log_and_apply(
                &mut table,
                WalEntryKind::Put {
                    guid: guid.as_str().to_string(),
                    family,
                    cells: vec![(column.to_string(), value)],
                },
            )?;
            table.revision()
        };
        self.maybe_compact();
        Ok(revision)
    }

    fn delete(&self, guid: &Guid) -> Result<bool, StorageError> {
        let mut table = self.table.write().map_err(|_| lock_err("persistent.delete"))?;
        if table.get(guid.as_str(), &FamilyFilter::All).is_none() {
            return Ok(false);
        }
        self.log_and_apply(
            &mut table,
            WalEntryKind::Delete {
                guid: guid.as_str().to_string(),
            },
        )?;
        Ok(true)
    }

    fn delete_family(&self, family: Family) -> Result<usize, StorageError> {
        let mut table = self
            .table
            .write()
            .map_err(|_| lock_err("persistent.delete_family"))?;
        let touched = table.rows_with_family(family);
        if touched > 0 {
            self.log_and_apply(&mut table, WalEntryKind::DeleteFamily { family })?;
        }
        Ok(touched)
    }

    fn scan(&self, filter: FamilyFilter) -> Result<RowScan<'_>, StorageError> {
        Ok(scan_table(Arc::clone(&self.table), filter))
    }

    fn row_count(&self) -> Result<usize, StorageError> {
        let table = self.table.read().map_err(|_| lock_err("persistent.row_count"))?;
        Ok(table.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> PersistentConfig {
        PersistentConfig {
            sync_on_write: false,
            ..PersistentConfig::default()
        }
    }

    fn guid(s: &str) -> Guid {
        Guid::parse(s).unwrap()
    }

    #[test]
    fn test_reopen_replays_wal_with_same_revisions() {
        let dir = tempdir().unwrap();
        let rev;
        {
            let store = PersistentConceptStore::open(dir.path(), config()).unwrap();
            store
                .put(&guid("urn:1"), Family::Core, vec![("nameString".into(), "Canis".into())])
                .unwrap();
            rev = store
                .compare_and_swap(&guid("urn:1"), Family::Core, "hasSynonym", None, "[]".into())
                .unwrap();
        }
        let store = PersistentConceptStore::open(dir.path(), config()).unwrap();
        let row = store.get(&guid("urn:1"), &FamilyFilter::All).unwrap().unwrap();
        assert_eq!(row.value(Family::Core, "nameString"), Some("Canis"));
        assert_eq!(row.revision(Family::Core, "hasSynonym"), Some(rev));
    }

    #[test]
    fn test_compaction_then_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = PersistentConceptStore::open(dir.path(), config()).unwrap();
            for i in 0..5 {
                store
                    .put(&guid(&format!("urn:{i}")), Family::Core, vec![("n".into(), i.to_string())])
                    .unwrap();
            }
            let result = store.compact().unwrap();
            assert_eq!(result.rows, 5);
            assert_eq!(result.entries_compacted, 5);
            assert!(result.wal_size_after < result.wal_size_before);
            store.delete(&guid("urn:0")).unwrap();
        }
        let store = PersistentConceptStore::open(dir.path(), config()).unwrap();
        assert_eq!(store.row_count().unwrap(), 4);
    }

    #[test]
    fn test_second_open_is_unavailable() {
        let dir = tempdir().unwrap();
        let _first = PersistentConceptStore::open(dir.path(), config()).unwrap();
        let err = PersistentConceptStore::open(dir.path(), config()).unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
    }

    #[test]
    fn test_delete_family_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = PersistentConceptStore::open(dir.path(), config()).unwrap();
            store.put(&guid("urn:1"), Family::Core, vec![("n".into(), "x".into())]).unwrap();
            store.put(&guid("urn:1"), Family::Raw, vec![("src".into(), "y".into())]).unwrap();
            assert_eq!(store.delete_family(Family::Raw).unwrap(), 1);
        }
        let store = PersistentConceptStore::open(dir.path(), config()).unwrap();
        let row = store.get(&guid("urn:1"), &FamilyFilter::All).unwrap().unwrap();
        assert!(row.family_is_empty(Family::Raw));
    }
}
