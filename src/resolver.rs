//! Name resolution: mapping a candidate scientific name to a concept GUID.
//!
//! The real resolver is an external name-authority service. This module
//! defines the seam, an in-memory implementation, and a wrapper that bounds
//! every call with a timeout so that ingestion never hangs on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use tracing::warn;

use crate::error::ResolverError;
use crate::guid::Guid;
use crate::rank::Rank;

/// One resolution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameQuery {
    /// Candidate scientific name.
    pub scientific_name: String,
    /// Genus hint.
    pub genus: Option<String>,
    /// Kingdom hint.
    pub kingdom: Option<String>,
    /// Rank of the candidate, if known.
    pub rank: Option<Rank>,
}

impl NameQuery {
    /// Query with no hints.
    #[must_use]
    pub fn new(scientific_name: impl Into<String>) -> Self {
        Self {
            scientific_name: scientific_name.into(),
            genus: None,
            kingdom: None,
            rank: None,
        }
    }
}

/// Name authority seam.
pub trait NameResolver: Send + Sync {
    /// Resolves a name to a GUID. `Ok(None)` means "not found".
    fn resolve(&self, query: &NameQuery) -> Result<Option<Guid>, ResolverError>;
}

impl<R: NameResolver + ?Sized> NameResolver for Arc<R> {
    fn resolve(&self, query: &NameQuery) -> Result<Option<Guid>, ResolverError> {
        (**self).resolve(query)
    }
}

/// Resolver backed by a name table.
///
/// Names match case-insensitively. A name registered with a rank only
/// resolves for queries with no rank or the same rank. Every query is
/// recorded so callers can inspect the retry sequence.
#[derive(Debug, Default)]
pub struct InMemoryNameResolver {
    names: HashMap<String, (Guid, Option<Rank>)>,
    calls: Mutex<Vec<NameQuery>>,
}

impl InMemoryNameResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a name.
    #[must_use]
    pub fn with_name(mut self, name: &str, rank: Option<Rank>, guid: Guid) -> Self {
        self.names.insert(name.trim().to_lowercase(), (guid, rank));
        self
    }

    /// Queries received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<NameQuery> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl NameResolver for InMemoryNameResolver {
    fn resolve(&self, query: &NameQuery) -> Result<Option<Guid>, ResolverError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(query.clone());
        }
        let key = query.scientific_name.trim().to_lowercase();
        Ok(self.names.get(&key).and_then(|(guid, rank)| match (rank, query.rank) {
            (Some(registered), Some(asked)) if *registered != asked => None,
            _ => Some(guid.clone()),
        }))
    }
}

/// Bounds every call to an inner resolver with a timeout.
///
/// Each call runs on a short-lived named thread; on timeout the result is
/// abandoned and `ResolverError::Timeout` is returned.
pub struct TimeoutResolver {
    inner: Arc<dyn NameResolver>,
    timeout: Duration,
}

impl TimeoutResolver {
    /// Wraps `inner` with `timeout`.
    #[must_use]
    pub fn new(inner: Arc<dyn NameResolver>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl NameResolver for TimeoutResolver {
    fn resolve(&self, query: &NameQuery) -> Result<Option<Guid>, ResolverError> {
        let (tx, rx) = bounded(1);
        let inner = Arc::clone(&self.inner);
        let owned = query.clone();
        thread::Builder::new()
            .name("taxon-resolve".to_string())
            .spawn(move || {
                let _ = tx.send(inner.resolve(&owned));
            })
            .map_err(|e| ResolverError::Unavailable {
                message: format!("failed to spawn resolver thread: {e}"),
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                let duration_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(name = %query.scientific_name, duration_ms, "name resolution timed out");
                Err(ResolverError::Timeout { duration_ms })
            }
            Err(RecvTimeoutError::Disconnected) => Err(ResolverError::Unavailable {
                message: "resolver thread exited without a result".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowResolver(Duration);

    impl NameResolver for SlowResolver {
        fn resolve(&self, _query: &NameQuery) -> Result<Option<Guid>, ResolverError> {
            thread::sleep(self.0);
            Ok(None)
        }
    }

    #[test]
    fn test_in_memory_rank_matching() {
        let guid = Guid::parse("urn:canis").unwrap();
        let resolver =
            InMemoryNameResolver::new().with_name("Canis", Some(Rank::Genus), guid.clone());

        let mut q = NameQuery::new("canis");
        assert_eq!(resolver.resolve(&q).unwrap(), Some(guid.clone()));
        q.rank = Some(Rank::Genus);
        assert_eq!(resolver.resolve(&q).unwrap(), Some(guid));
        q.rank = Some(Rank::Species);
        assert_eq!(resolver.resolve(&q).unwrap(), None);
        assert_eq!(resolver.calls().len(), 3);
    }

    #[test]
    fn test_timeout_resolver_times_out() {
        let resolver = TimeoutResolver::new(
            Arc::new(SlowResolver(Duration::from_millis(500))),
            Duration::from_millis(20),
        );
        let err = resolver.resolve(&NameQuery::new("Canis")).unwrap_err();
        assert!(matches!(err, ResolverError::Timeout { duration_ms: 20 }));
    }

    #[test]
    fn test_timeout_resolver_passes_result_through() {
        let guid = Guid::parse("urn:vulpes").unwrap();
        let inner = Arc::new(InMemoryNameResolver::new().with_name("Vulpes", None, guid.clone()));
        let resolver = TimeoutResolver::new(inner, Duration::from_secs(5));
        assert_eq!(resolver.resolve(&NameQuery::new("Vulpes")).unwrap(), Some(guid));
    }
}
