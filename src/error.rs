//! Error types for taxonstore.
//!
//! All errors are strongly typed using thiserror. Each subsystem owns an
//! error enum and [`TaxonError`] wraps them for callers that drive several
//! subsystems at once (the engine and the runtime).

use thiserror::Error;

use crate::storage::StorageError;

/// Validation errors raised before any store or index work happens.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("GUID cannot be null or blank")]
    InvalidGuid,

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Errors raised while building or opening a search index generation.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("An index rebuild is already running")]
    RebuildInProgress,

    #[error("Index engine error: {message}")]
    Engine {
        message: String,
    },

    #[error("Index I/O error: {message}")]
    Io {
        message: String,
    },

    #[error("Storage error during rebuild: {0}")]
    Storage(#[from] StorageError),
}

impl From<tantivy::TantivyError> for IndexError {
    fn from(e: tantivy::TantivyError) -> Self {
        Self::Engine {
            message: e.to_string(),
        }
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}

/// Errors raised by the query engine.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Malformed query '{input}': {reason}")]
    Syntax {
        input: String,
        reason: String,
    },

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

impl From<tantivy::TantivyError> for QueryError {
    fn from(e: tantivy::TantivyError) -> Self {
        Self::Index(IndexError::from(e))
    }
}

/// Errors surfaced by the external name resolution service.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Name resolution timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Name resolution service unavailable: {message}")]
    Unavailable {
        message: String,
    },
}

/// Errors that fail a whole ingestion batch.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("No taxonomic hierarchy found for document at {file_path}")]
    InsufficientData {
        file_path: String,
    },

    #[error("Unable to resolve '{name}' to a taxon concept after {attempts} attempt(s)")]
    NameNotResolved {
        name: String,
        attempts: usize,
    },

    #[error("Name resolution failed: {0}")]
    Resolver(#[from] ResolverError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors raised by the worker runtime.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Queue full for {pool} pool (capacity {capacity})")]
    QueueFull {
        pool: String,
        capacity: usize,
    },

    #[error("Worker pool {pool} disconnected")]
    Disconnected {
        pool: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Failed to start {pool} worker: {message}")]
    Spawn {
        pool: String,
        message: String,
    },
}

/// Top-level error type for taxonstore.
#[derive(Debug, Error)]
pub enum TaxonError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl TaxonError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the caller supplied an invalid argument (blank GUID, bad config).
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Storage(StorageError::InvalidArgument { .. })
        )
    }

    /// Returns true if the underlying store could not be reached.
    #[must_use]
    pub const fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Storage(StorageError::Unavailable { .. })
                | Self::Ingest(IngestError::Storage(StorageError::Unavailable { .. }))
                | Self::Index(IndexError::Storage(StorageError::Unavailable { .. }))
        )
    }

    /// Returns true if the error is a malformed query.
    #[must_use]
    pub const fn is_query_syntax(&self) -> bool {
        matches!(self, Self::Query(QueryError::Syntax { .. }))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Query(_) | Self::Internal { .. } => false,
            Self::Storage(e) | Self::Index(IndexError::Storage(e)) => e.is_transient(),
            Self::Index(IndexError::RebuildInProgress) => true,
            Self::Index(_) => false,
            Self::Ingest(e) => match e {
                IngestError::Resolver(ResolverError::Timeout { .. }) => true,
                IngestError::Storage(s) => s.is_transient(),
                _ => false,
            },
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. } | ExecutionError::QueueFull { .. }
            ),
        }
    }
}

/// Result type alias for taxonstore operations.
pub type TaxonResult<T> = Result<T, TaxonError>;
