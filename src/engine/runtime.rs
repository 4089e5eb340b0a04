//! Thread-based runtime for ingestion batches and index rebuilds.
//!
//! Ingestion and rebuilds run on separate bounded worker pools so that a
//! long rebuild never starves ingestion. The index pool has exactly one
//! worker: rebuilds are single-writer jobs.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::engine::TaxonEngine;
use crate::error::{ExecutionError, TaxonError, TaxonResult};
use crate::index::RebuildReport;
use crate::ingest::{IngestReport, SourceDocument, Triple};

/// Worker pool a job runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerPoolKind {
    /// Ingestion batches.
    Ingest,
    /// Index rebuilds.
    Index,
}

impl WorkerPoolKind {
    /// Pool name, as used in thread names and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Index => "index",
        }
    }
}

enum Job {
    Ingest {
        document: SourceDocument,
        triples: Vec<Triple>,
        reply: Sender<TaxonResult<IngestReport>>,
    },
    Rebuild {
        reply: Sender<TaxonResult<RebuildReport>>,
    },

    #[cfg(test)]
    Sleep {
        duration: Duration,
        reply: Sender<()>,
    },
}

struct WorkerPool {
    kind: WorkerPoolKind,
    tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl WorkerPool {
    fn start(
        kind: WorkerPoolKind,
        workers: usize,
        queue_capacity: usize,
        engine: &Arc<TaxonEngine>,
    ) -> Result<Self, ExecutionError> {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let mut pool = Self {
            kind,
            tx,
            workers: Vec::with_capacity(workers),
            queue_capacity,
        };
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let engine = Arc::clone(engine);
            let handle = thread::Builder::new()
                .name(format!("taxon-{}-{idx}", kind.as_str()))
                .spawn(move || run_worker(&engine, &rx))
                .map_err(|e| ExecutionError::Spawn {
                    pool: kind.as_str().to_string(),
                    message: e.to_string(),
                })?;
            pool.workers.push(handle);
        }
        Ok(pool)
    }

    fn idle(kind: WorkerPoolKind) -> Self {
        Self {
            kind,
            tx: bounded::<Job>(1).0,
            workers: Vec::new(),
            queue_capacity: 1,
        }
    }

    fn try_submit(&self, job: Job) -> Result<(), ExecutionError> {
        let pool = self.kind.as_str().to_string();
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(pool = %pool, capacity = self.queue_capacity, "worker queue full");
                Err(ExecutionError::QueueFull {
                    pool,
                    capacity: self.queue_capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => Err(ExecutionError::Disconnected { pool }),
        }
    }

    fn shutdown(self) {
        // Workers drain queued jobs, then see the closed channel and exit.
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.join();
        }
    }
}

fn run_worker(engine: &TaxonEngine, rx: &Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        match job {
            Job::Ingest {
                document,
                triples,
                reply,
            } => {
                let _ = reply.send(engine.ingest(&document, &triples));
            }
            Job::Rebuild { reply } => {
                let _ = reply.send(engine.rebuild_index());
            }

            #[cfg(test)]
            Job::Sleep { duration, reply } => {
                thread::sleep(duration);
                let _ = reply.send(());
            }
        }
    }
    debug!("worker exiting");
}

/// Pending result of a submitted job.
pub struct ExecutionHandle<T> {
    pool: WorkerPoolKind,
    rx: Receiver<TaxonResult<T>>,
}

impl<T> std::fmt::Debug for ExecutionHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl<T> ExecutionHandle<T> {
    /// Pool the job was submitted to.
    #[must_use]
    pub const fn pool(&self) -> WorkerPoolKind {
        self.pool
    }

    fn disconnected(&self) -> TaxonError {
        TaxonError::Execution(ExecutionError::Disconnected {
            pool: self.pool.as_str().to_string(),
        })
    }

    /// Waits for the job to finish.
    ///
    /// # Errors
    /// The job's own error, or `ExecutionError::Disconnected` if the worker
    /// went away without replying.
    pub fn join(self) -> TaxonResult<T> {
        self.rx.recv().map_err(|_| self.disconnected())?
    }

    /// Waits for the job to finish, at most `timeout`.
    ///
    /// # Errors
    /// `ExecutionError::Timeout` if no reply arrived in time; otherwise as
    /// [`join`](Self::join).
    pub fn join_timeout(self, timeout: Duration) -> TaxonResult<T> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => TaxonError::Execution(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => self.disconnected(),
        })?
    }
}

/// Runs ingestion and rebuilds on background worker pools.
pub struct TaxonRuntime {
    engine: Arc<TaxonEngine>,
    ingest: WorkerPool,
    index: WorkerPool,
}

impl std::fmt::Debug for TaxonRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaxonRuntime")
            .field("ingest_workers", &self.ingest.workers.len())
            .field("queue_capacity", &self.ingest.queue_capacity)
            .finish_non_exhaustive()
    }
}

impl TaxonRuntime {
    /// Starts the worker pools, sized from the engine's configuration.
    ///
    /// # Errors
    /// `ExecutionError::Spawn` if a worker thread cannot be started.
    pub fn new(engine: TaxonEngine) -> TaxonResult<Self> {
        let config = engine.config().runtime.clone();
        Self::with_config(engine, &config)
    }

    /// Starts the worker pools with explicit sizing.
    ///
    /// # Errors
    /// `ExecutionError::Spawn` if a worker thread cannot be started.
    pub fn with_config(engine: TaxonEngine, config: &RuntimeConfig) -> TaxonResult<Self> {
        let engine = Arc::new(engine);
        let ingest = WorkerPool::start(
            WorkerPoolKind::Ingest,
            config.ingest_workers,
            config.queue_capacity,
            &engine,
        )?;
        let index = WorkerPool::start(WorkerPoolKind::Index, 1, config.queue_capacity, &engine)?;
        Ok(Self {
            engine,
            ingest,
            index,
        })
    }

    /// Queues an ingestion batch.
    ///
    /// # Errors
    /// `ExecutionError::QueueFull` when the ingest queue is at capacity.
    pub fn ingest_async(
        &self,
        document: SourceDocument,
        triples: Vec<Triple>,
    ) -> TaxonResult<ExecutionHandle<IngestReport>> {
        let (reply, rx) = bounded(1);
        self.ingest.try_submit(Job::Ingest {
            document,
            triples,
            reply,
        })?;
        Ok(ExecutionHandle {
            pool: WorkerPoolKind::Ingest,
            rx,
        })
    }

    /// Ingests a batch on the ingest pool and waits for it.
    ///
    /// # Errors
    /// As [`ingest_async`](Self::ingest_async) and [`TaxonEngine::ingest`].
    pub fn ingest(&self, document: SourceDocument, triples: Vec<Triple>) -> TaxonResult<IngestReport> {
        self.ingest_async(document, triples)?.join()
    }

    /// Queues an index rebuild.
    ///
    /// # Errors
    /// `ExecutionError::QueueFull` when the index queue is at capacity.
    pub fn rebuild_async(&self) -> TaxonResult<ExecutionHandle<RebuildReport>> {
        let (reply, rx) = bounded(1);
        self.index.try_submit(Job::Rebuild { reply })?;
        Ok(ExecutionHandle {
            pool: WorkerPoolKind::Index,
            rx,
        })
    }

    /// Shared engine, for queries. Queries run on the caller's thread.
    #[must_use]
    pub fn engine(&self) -> &TaxonEngine {
        &self.engine
    }

    #[cfg(test)]
    fn submit_sleep(&self, pool: WorkerPoolKind, duration: Duration) -> Result<Receiver<()>, ExecutionError> {
        let (reply, rx) = bounded::<()>(1);
        let job = Job::Sleep { duration, reply };
        match pool {
            WorkerPoolKind::Ingest => self.ingest.try_submit(job)?,
            WorkerPoolKind::Index => self.index.try_submit(job)?,
        }
        Ok(rx)
    }
}

impl Drop for TaxonRuntime {
    fn drop(&mut self) {
        let ingest = std::mem::replace(&mut self.ingest, WorkerPool::idle(WorkerPoolKind::Ingest));
        let index = std::mem::replace(&mut self.index, WorkerPool::idle(WorkerPoolKind::Index));
        ingest.shutdown();
        index.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::guid::Guid;
    use crate::resolver::InMemoryNameResolver;
    use crate::vocabulary::InMemoryVocabulary;

    fn runtime(config: &RuntimeConfig) -> TaxonRuntime {
        let resolver = InMemoryNameResolver::new().with_name(
            "Canis lupus",
            None,
            Guid::parse("urn:lsid:wolf").unwrap(),
        );
        let engine =
            TaxonEngine::in_memory(Arc::new(resolver), Arc::new(InMemoryVocabulary::new())).unwrap();
        TaxonRuntime::with_config(engine, config).unwrap()
    }

    fn wolf_batch() -> (SourceDocument, Vec<Triple>) {
        (
            SourceDocument::new("/data/1/1", "1", "1"),
            vec![
                Triple::new("tc#hasScientificName", "Canis lupus"),
                Triple::new("tc#hasCommonName", "Wolf"),
            ],
        )
    }

    #[test]
    fn rebuild_does_not_starve_ingest() {
        let runtime = runtime(&RuntimeConfig {
            ingest_workers: 1,
            queue_capacity: 16,
        });

        // Occupy the index worker.
        let sleep = runtime
            .submit_sleep(WorkerPoolKind::Index, Duration::from_millis(300))
            .unwrap();

        let (doc, triples) = wolf_batch();
        let handle = runtime.ingest_async(doc, triples).unwrap();
        assert_eq!(handle.pool(), WorkerPoolKind::Ingest);
        let report = handle.join_timeout(Duration::from_millis(200)).unwrap();
        assert_eq!(report.guid.as_str(), "urn:lsid:wolf");

        sleep.recv_timeout(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn rebuild_runs_on_index_pool() {
        let runtime = runtime(&RuntimeConfig::default());
        let (doc, triples) = wolf_batch();
        runtime.ingest(doc, triples).unwrap();

        let handle = runtime.rebuild_async().unwrap();
        assert_eq!(handle.pool(), WorkerPoolKind::Index);
        let report = handle.join_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(report.primary_documents, 1);
        assert_eq!(runtime.engine().index().generation(), Some(report.generation));
    }

    #[test]
    fn full_queue_is_reported() {
        let runtime = runtime(&RuntimeConfig {
            ingest_workers: 1,
            queue_capacity: 1,
        });
        // One job in the worker, one in the queue; at least one of three
        // submissions must bounce.
        let results: Vec<_> = (0..3)
            .map(|_| runtime.submit_sleep(WorkerPoolKind::Index, Duration::from_millis(200)))
            .collect();
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(ExecutionError::QueueFull { pool, capacity: 1 }) if pool == "index")));
    }

    #[test]
    fn join_reports_disconnected_when_reply_sender_dropped() {
        let (tx, rx) = bounded::<TaxonResult<IngestReport>>(1);
        drop(tx);
        let handle = ExecutionHandle {
            pool: WorkerPoolKind::Ingest,
            rx,
        };
        let err = handle.join().unwrap_err();
        let TaxonError::Execution(ExecutionError::Disconnected { pool }) = err else {
            panic!("expected Disconnected, got {err:?}");
        };
        assert_eq!(pool, "ingest");
    }

    #[test]
    fn join_timeout_reports_timeout_while_sender_alive() {
        let (_tx, rx) = bounded::<TaxonResult<RebuildReport>>(1);
        let handle = ExecutionHandle {
            pool: WorkerPoolKind::Index,
            rx,
        };
        let err = handle.join_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(
            err,
            TaxonError::Execution(ExecutionError::Timeout { duration_ms: 10 })
        ));
    }
}
