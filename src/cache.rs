use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::fetch::EntitySource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// The entity file was already on disk; nothing was fetched.
    Hit,
    /// The document was fetched and written.
    Fetched,
    /// The fetch gave up; a `null` document was written in its place.
    Unavailable,
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub fetched: AtomicU64,
    pub unavailable: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheCounts {
    pub hits: u64,
    pub fetched: u64,
    pub unavailable: u64,
}

impl CacheStats {
    pub fn snapshot(&self) -> CacheCounts {
        CacheCounts {
            hits: self.hits.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: CacheOutcome) {
        let counter = match outcome {
            CacheOutcome::Hit => &self.hits,
            CacheOutcome::Fetched => &self.fetched,
            CacheOutcome::Unavailable => &self.unavailable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Write-once, on-disk cache of entity documents: `<root>/<movie_id>/<entity_id>.json`.
///
/// A file's existence is the only freshness signal. There is no locking, so two
/// workers may both miss on the same entity and both fetch it; each write replaces
/// the whole file, so the last writer wins.
pub struct EntityCache {
    root: PathBuf,
    source: Arc<dyn EntitySource>,
    stats: CacheStats,
}

impl EntityCache {
    pub fn new(root: impl Into<PathBuf>, source: Arc<dyn EntitySource>) -> Self {
        Self {
            root: root.into(),
            source,
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Directory holding the related entities of one movie, created on demand.
    pub fn movie_dir(&self, movie_id: &str) -> Result<PathBuf> {
        let dir = self.root.join(movie_id);
        create_dir_all(&dir)
            .with_context(|| format!("creating cache directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Make sure `entity_id` is cached under `movie_dir`, fetching it on a miss.
    pub fn ensure(&self, movie_dir: &Path, entity_id: &str) -> Result<CacheOutcome> {
        let path = movie_dir.join(format!("{}.json", entity_id));
        if path.exists() {
            debug!("Cache hit: {}", path.display());
            self.stats.record(CacheOutcome::Hit);
            return Ok(CacheOutcome::Hit);
        }

        let (document, outcome) = match self.source.fetch(entity_id) {
            Some(document) => (document, CacheOutcome::Fetched),
            None => (Value::Null, CacheOutcome::Unavailable),
        };

        let bytes = serde_json::to_vec_pretty(&document)?;
        fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;

        self.stats.record(outcome);
        Ok(outcome)
    }
}
