//! Runtime configuration.
//!
//! Every section has a `Default`; [`TaxonConfig::validate`] must be called
//! (or [`TaxonConfig::from_env`] used) before the values are trusted.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ValidationError;

/// Relevance boosts applied per field group.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BoostConfig {
    /// Scientific-name matches.
    pub name: f32,
    /// Common-name matches.
    pub common_name: f32,
    /// Conservation and pest status terms.
    pub status: f32,
    /// Narrative text properties.
    pub text: f32,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            name: 1.0,
            common_name: 1.0,
            status: 0.6,
            text: 0.4,
        }
    }
}

/// Search index settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding index generations. `None` keeps them in RAM.
    pub directory: Option<PathBuf>,
    /// Records processed between intermediate commits during a rebuild.
    pub commit_interval: usize,
    /// Memory budget of the index writer.
    pub writer_heap_bytes: usize,
    /// Field boosts.
    pub boosts: BoostConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            directory: None,
            commit_interval: 10_000,
            writer_heap_bytes: 50_000_000,
            boosts: BoostConfig::default(),
        }
    }
}

impl IndexConfig {
    /// The index engine refuses smaller writer budgets.
    pub const MIN_WRITER_HEAP_BYTES: usize = 15_000_000;
}

/// Ingestion settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Upper bound on a single name-resolution call.
    #[serde(with = "duration_ms")]
    pub resolve_timeout: Duration,
    /// Compare-and-swap attempts per list append before giving up.
    pub max_append_attempts: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            resolve_timeout: Duration::from_secs(5),
            max_append_attempts: 16,
        }
    }
}

/// Worker runtime settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Threads running ingestion batches.
    pub ingest_workers: usize,
    /// Maximum queued jobs per pool.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ingest_workers: 2,
            queue_capacity: 1024,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaxonConfig {
    /// Search index.
    pub index: IndexConfig,
    /// Ingestion pipeline.
    pub ingest: IngestConfig,
    /// Worker runtime.
    pub runtime: RuntimeConfig,
    /// Persistent concept store.
    #[cfg(feature = "persistent")]
    pub persistent: crate::storage::persistent::PersistentConfig,
}

impl TaxonConfig {
    /// Validates every section.
    ///
    /// # Errors
    /// `ValidationError::InvalidConfig` naming the first offending key.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.index.commit_interval == 0 {
            return Err(invalid("index.commit_interval must be at least 1"));
        }
        if self.index.writer_heap_bytes < IndexConfig::MIN_WRITER_HEAP_BYTES {
            return Err(invalid(format!(
                "index.writer_heap_bytes must be at least {} (got {})",
                IndexConfig::MIN_WRITER_HEAP_BYTES,
                self.index.writer_heap_bytes
            )));
        }
        let b = self.index.boosts;
        for (key, value) in [
            ("name", b.name),
            ("common_name", b.common_name),
            ("status", b.status),
            ("text", b.text),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(format!(
                    "index.boosts.{key} must be a positive number (got {value})"
                )));
            }
        }
        if self.ingest.resolve_timeout.is_zero() {
            return Err(invalid("ingest.resolve_timeout must be non-zero"));
        }
        if self.ingest.max_append_attempts == 0 {
            return Err(invalid("ingest.max_append_attempts must be at least 1"));
        }
        if self.runtime.ingest_workers == 0 {
            return Err(invalid("runtime.ingest_workers must be at least 1"));
        }
        if self.runtime.queue_capacity == 0 {
            return Err(invalid("runtime.queue_capacity must be at least 1"));
        }
        #[cfg(feature = "persistent")]
        let config = {
            let mut config = self;
            config.persistent = config.persistent.validate()?;
            config
        };
        #[cfg(not(feature = "persistent"))]
        let config = self;
        Ok(config)
    }

    /// Defaults overridden by `TAXON_*` environment variables, validated.
    ///
    /// Recognised variables: `TAXON_INDEX_DIR`, `TAXON_INDEX_COMMIT_INTERVAL`,
    /// `TAXON_RESOLVE_TIMEOUT_MS`, `TAXON_INGEST_WORKERS`, `TAXON_QUEUE_CAPACITY`.
    ///
    /// # Errors
    /// `ValidationError::InvalidConfig` if a variable does not parse or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ValidationError> {
        let mut config = Self::default();
        if let Some(dir) = lookup("TAXON_INDEX_DIR").filter(|d| !d.trim().is_empty()) {
            config.index.directory = Some(PathBuf::from(dir));
        }
        if let Some(v) = parse_var(&lookup, "TAXON_INDEX_COMMIT_INTERVAL")? {
            config.index.commit_interval = v;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TAXON_RESOLVE_TIMEOUT_MS")? {
            config.ingest.resolve_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = parse_var(&lookup, "TAXON_INGEST_WORKERS")? {
            config.runtime.ingest_workers = v;
        }
        if let Some(v) = parse_var(&lookup, "TAXON_QUEUE_CAPACITY")? {
            config.runtime.queue_capacity = v;
        }
        config.validate()
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ValidationError> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| invalid(format!("{key} is not a valid number: '{raw}'")))
        })
        .transpose()
}

fn invalid(reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidConfig {
        reason: reason.into(),
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
