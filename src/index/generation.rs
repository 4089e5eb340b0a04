//! Index generations and the swappable handle that serves them.
//!
//! A rebuild always writes into a fresh generation. Readers keep whichever
//! generation they picked up (an `Arc`) for the whole query, and the handle
//! only points at a new generation once it has been fully committed. On disk
//! each generation lives in `gen-<n>/` and is considered usable only once its
//! `COMPLETE` marker exists. A replaced generation's directory is removed
//! when the last `Arc` to it drops, so held searchers keep their files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError};

use tantivy::{Index, IndexReader, ReloadPolicy, Searcher};
use tracing::{debug, info, warn};

use crate::error::IndexError;
use crate::index::schema::{build_schema, register_tokenizers, TaxonFields};

const GENERATION_PREFIX: &str = "gen-";
const COMPLETE_MARKER: &str = "COMPLETE";

/// One committed, immutable index generation.
pub struct IndexGeneration {
    id: u64,
    reader: IndexReader,
    index: Index,
    fields: TaxonFields,
    // declared last: dropped after the reader and index have closed their files
    dir: GenerationDir,
}

/// On-disk location of a generation, removed on drop once retired.
#[derive(Debug)]
struct GenerationDir {
    id: u64,
    path: Option<PathBuf>,
    retired: AtomicBool,
}

impl Drop for GenerationDir {
    fn drop(&mut self) {
        if !self.retired.load(Ordering::Acquire) {
            return;
        }
        if let Some(path) = &self.path {
            debug!(generation = self.id, path = %path.display(), "removing retired index generation");
            remove_dir_logged(path);
        }
    }
}

impl std::fmt::Debug for IndexGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexGeneration")
            .field("id", &self.id)
            .field("path", &self.dir.path)
            .field("retired", &self.is_retired())
            .finish_non_exhaustive()
    }
}

impl IndexGeneration {
    fn open(id: u64, index: Index, path: Option<PathBuf>) -> Result<Self, IndexError> {
        register_tokenizers(&index);
        let fields = TaxonFields::from_schema(&index.schema())?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(Self {
            id,
            reader,
            index,
            fields,
            dir: GenerationDir {
                id,
                path,
                retired: AtomicBool::new(false),
            },
        })
    }

    /// Generation number.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Field handles.
    #[must_use]
    pub const fn fields(&self) -> &TaxonFields {
        &self.fields
    }

    /// The underlying index (for tokenizers).
    #[must_use]
    pub const fn index(&self) -> &Index {
        &self.index
    }

    /// A searcher over this generation.
    #[must_use]
    pub fn searcher(&self) -> Searcher {
        self.reader.searcher()
    }

    /// Directory of this generation, if on disk.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.path.as_deref()
    }

    /// Whether a newer generation has replaced this one.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.dir.retired.load(Ordering::Acquire)
    }

    fn retire(&self) {
        self.dir.retired.store(true, Ordering::Release);
    }
}

/// Injected, swappable holder of the live index generation.
#[derive(Debug)]
pub struct IndexHandle {
    directory: Option<PathBuf>,
    current: RwLock<Option<Arc<IndexGeneration>>>,
    rebuilding: Mutex<()>,
    last_id: AtomicU64,
}

impl IndexHandle {
    /// Handle that keeps generations in RAM. Nothing is served until the
    /// first rebuild completes.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            directory: None,
            current: RwLock::new(None),
            rebuilding: Mutex::new(()),
            last_id: AtomicU64::new(0),
        }
    }

    /// Opens a handle over `directory`, serving the newest complete
    /// generation found there. Incomplete generations are deleted.
    ///
    /// # Errors
    /// `IndexError::Io` if the directory cannot be created or listed;
    /// `IndexError::Engine` if the newest complete generation cannot be opened.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;

        let mut complete = Vec::new();
        for entry in fs::read_dir(&directory)? {
            let path = entry?.path();
            let Some(id) = generation_id(&path) else {
                continue;
            };
            if path.join(COMPLETE_MARKER).exists() {
                complete.push((id, path));
            } else {
                warn!(path = %path.display(), "removing incomplete index generation");
                remove_dir_logged(&path);
            }
        }
        complete.sort_by_key(|(id, _)| *id);

        let last_id = complete.last().map_or(0, |(id, _)| *id);
        let current = match complete.pop() {
            Some((id, path)) => {
                let index = Index::open_in_dir(&path)?;
                info!(generation = id, path = %path.display(), "opened index generation");
                Some(Arc::new(IndexGeneration::open(id, index, Some(path))?))
            }
            None => None,
        };
        for (_, stale) in complete {
            remove_dir_logged(&stale);
        }

        Ok(Self {
            directory: Some(directory),
            current: RwLock::new(current),
            rebuilding: Mutex::new(()),
            last_id: AtomicU64::new(last_id),
        })
    }

    /// The generation queries should use, or `None` before the first build.
    #[must_use]
    pub fn current(&self) -> Option<Arc<IndexGeneration>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Id of the live generation.
    #[must_use]
    pub fn generation(&self) -> Option<u64> {
        self.current().map(|g| g.id())
    }

    /// Directory holding generations, if on disk.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Reserves the single rebuild slot and creates an empty generation.
    ///
    /// # Errors
    /// `IndexError::RebuildInProgress` if another rebuild holds the slot.
    pub(crate) fn begin(&self) -> Result<PendingGeneration<'_>, IndexError> {
        let guard = match self.rebuilding.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(IndexError::RebuildInProgress),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let schema = build_schema();
        let (index, path) = match &self.directory {
            Some(dir) => {
                let path = dir.join(format!("{GENERATION_PREFIX}{id}"));
                if path.exists() {
                    fs::remove_dir_all(&path)?;
                }
                fs::create_dir_all(&path)?;
                (Index::create_in_dir(&path, schema)?, Some(path))
            }
            None => (Index::create_in_ram(schema), None),
        };
        register_tokenizers(&index);
        let fields = TaxonFields::from_schema(&index.schema())?;
        Ok(PendingGeneration {
            handle: self,
            _slot: guard,
            id,
            index: Some(index),
            fields,
            path,
        })
    }

    fn swap(&self, generation: Arc<IndexGeneration>) {
        let previous = match self.current.write() {
            Ok(mut guard) => guard.replace(generation),
            Err(poisoned) => poisoned.into_inner().replace(generation),
        };
        // the directory goes once the last reader lets go
        if let Some(previous) = previous {
            previous.retire();
        }
    }
}

/// A generation being written. Dropping it without [`publish`](Self::publish)
/// discards it.
pub(crate) struct PendingGeneration<'a> {
    handle: &'a IndexHandle,
    _slot: MutexGuard<'a, ()>,
    id: u64,
    index: Option<Index>,
    fields: TaxonFields,
    path: Option<PathBuf>,
}

impl PendingGeneration<'_> {
    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    pub(crate) const fn fields(&self) -> &TaxonFields {
        &self.fields
    }

    pub(crate) fn index(&self) -> Result<&Index, IndexError> {
        self.index.as_ref().ok_or_else(|| IndexError::Engine {
            message: "generation already published".to_string(),
        })
    }

    /// Marks the generation complete and makes it the live one.
    pub(crate) fn publish(mut self) -> Result<Arc<IndexGeneration>, IndexError> {
        let index = self.index.take().ok_or_else(|| IndexError::Engine {
            message: "generation already published".to_string(),
        })?;
        if let Some(path) = &self.path {
            fs::write(path.join(COMPLETE_MARKER), self.id.to_string())?;
        }
        let generation = Arc::new(IndexGeneration::open(self.id, index, self.path.take())?);
        self.handle.swap(Arc::clone(&generation));
        Ok(generation)
    }
}

impl Drop for PendingGeneration<'_> {
    fn drop(&mut self) {
        if self.index.is_some() {
            if let Some(path) = &self.path {
                warn!(generation = self.id, "discarding unfinished index generation");
                remove_dir_logged(path);
            }
        }
    }
}

fn generation_id(path: &Path) -> Option<u64> {
    if !path.is_dir() {
        return None;
    }
    path.file_name()?
        .to_str()?
        .strip_prefix(GENERATION_PREFIX)?
        .parse()
        .ok()
}

fn remove_dir_logged(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        warn!(path = %path.display(), error = %e, "failed to remove index generation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_handle_starts_empty() {
        let handle = IndexHandle::in_memory();
        assert!(handle.current().is_none());
        assert!(handle.generation().is_none());
    }

    #[test]
    fn test_only_one_rebuild_at_a_time() {
        let handle = IndexHandle::in_memory();
        let pending = handle.begin().unwrap();
        assert!(matches!(handle.begin(), Err(IndexError::RebuildInProgress)));
        let published = pending.publish().unwrap();
        assert_eq!(published.id(), 1);
        assert_eq!(handle.generation(), Some(1));
        assert_eq!(handle.begin().unwrap().id(), 2);
    }

    #[test]
    fn test_dropped_generation_is_not_served() {
        let dir = tempfile::tempdir().unwrap();
        let handle = IndexHandle::open(dir.path()).unwrap();
        let pending = handle.begin().unwrap();
        let path = dir.path().join("gen-1");
        assert!(path.exists());
        drop(pending);
        assert!(!path.exists());
        assert!(handle.current().is_none());
    }

    #[test]
    fn test_replaced_generation_directory_outlives_its_readers() {
        let dir = tempfile::tempdir().unwrap();
        let handle = IndexHandle::open(dir.path()).unwrap();
        handle.begin().unwrap().publish().unwrap();
        let held = handle.current().unwrap();
        let first = dir.path().join("gen-1");

        handle.begin().unwrap().publish().unwrap();
        assert!(held.is_retired());
        assert!(first.join(COMPLETE_MARKER).exists(), "held generation kept on disk");
        assert_eq!(held.searcher().num_docs(), 0);

        drop(held);
        assert!(!first.exists(), "released generation removed");
        assert!(dir.path().join("gen-2").join(COMPLETE_MARKER).exists());
        assert!(!handle.current().unwrap().is_retired());
    }

    #[test]
    fn test_reopen_serves_newest_complete_generation() {
        let dir = tempfile::tempdir().unwrap();
        {
            let handle = IndexHandle::open(dir.path()).unwrap();
            handle.begin().unwrap().publish().unwrap();
            handle.begin().unwrap().publish().unwrap();
            assert!(!dir.path().join("gen-1").exists(), "stale generation removed");
        }
        fs::create_dir_all(dir.path().join("gen-9")).unwrap();

        let handle = IndexHandle::open(dir.path()).unwrap();
        assert_eq!(handle.generation(), Some(2));
        assert!(!dir.path().join("gen-9").exists(), "incomplete generation removed");
        assert_eq!(handle.begin().unwrap().id(), 3);
    }
}
