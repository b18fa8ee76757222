//! Existence cache
//!
//! Memoizes "does package P exist in backend B" for the lifetime of the
//! process. Each key owns a once-cell, so concurrent lookups of the same
//! `(backend, package)` wait for the first probe instead of dispatching
//! again. Failed probes leave the cell empty and are retried by the next
//! lookup.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::types::{BackendKind, PackageDetails};

/// Memoized outcome of one existence probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub exists: bool,
    pub last_checked: DateTime<Utc>,
    /// Backend-side name when it differs (Flatpak application ID)
    pub resolved_name: Option<String>,
    /// Near match recorded for a miss
    pub suggestion: Option<String>,
    /// Parsed details of a found package
    pub details: PackageDetails,
}

impl CacheEntry {
    /// Entry for a package the backend carries
    pub fn found(resolved_name: Option<String>, details: PackageDetails) -> Self {
        Self {
            exists: true,
            last_checked: Utc::now(),
            resolved_name,
            suggestion: None,
            details,
        }
    }

    /// Entry for a package the backend does not carry
    pub fn missing(suggestion: Option<String>) -> Self {
        Self {
            exists: false,
            last_checked: Utc::now(),
            resolved_name: None,
            suggestion,
            details: PackageDetails::default(),
        }
    }
}

type Key = (BackendKind, String);

/// Lock-guarded map from `(backend, package)` to a single-flight cell
#[derive(Debug, Default)]
pub struct ExistenceCache {
    cells: Mutex<HashMap<Key, Arc<OnceCell<CacheEntry>>>>,
}

impl ExistenceCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    async fn cell(&self, backend: BackendKind, package: &str) -> Arc<OnceCell<CacheEntry>> {
        let mut cells = self.cells.lock().await;
        cells
            .entry((backend, package.to_string()))
            .or_default()
            .clone()
    }

    /// Cached entry, if a probe already completed
    pub async fn get(&self, backend: BackendKind, package: &str) -> Option<CacheEntry> {
        let cells = self.cells.lock().await;
        cells
            .get(&(backend, package.to_string()))
            .and_then(|cell| cell.get().cloned())
    }

    /// Record an existence result, replacing any previous entry
    pub async fn put(&self, backend: BackendKind, package: &str, exists: bool) {
        let entry = if exists {
            CacheEntry::found(None, PackageDetails::default())
        } else {
            CacheEntry::missing(None)
        };
        self.insert(backend, package, entry).await;
    }

    /// Store a full entry, replacing any previous one
    pub async fn insert(&self, backend: BackendKind, package: &str, entry: CacheEntry) {
        let mut cells = self.cells.lock().await;
        cells.insert(
            (backend, package.to_string()),
            Arc::new(OnceCell::new_with(Some(entry))),
        );
    }

    /// Cached entry, or the result of `probe` stored for later lookups
    ///
    /// Concurrent callers for the same key share one `probe` run. An `Err`
    /// is returned to the caller that ran the probe and nothing is stored.
    ///
    /// # Errors
    /// Returns whatever `probe` returns on failure.
    pub async fn get_or_probe<F, Fut, E>(
        &self,
        backend: BackendKind,
        package: &str,
        probe: F,
    ) -> Result<CacheEntry, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheEntry, E>>,
    {
        let cell = self.cell(backend, package).await;
        if let Some(entry) = cell.get() {
            debug!(backend = %backend, package, "existence cache hit");
            return Ok(entry.clone());
        }
        cell.get_or_try_init(probe).await.cloned()
    }

    /// Drop one entry so the next lookup probes again
    pub async fn invalidate(&self, backend: BackendKind, package: &str) {
        let mut cells = self.cells.lock().await;
        cells.remove(&(backend, package.to_string()));
    }

    /// Drop every entry
    pub async fn clear(&self) {
        self.cells.lock().await.clear();
    }

    /// Number of completed entries
    pub async fn len(&self) -> usize {
        let cells = self.cells.lock().await;
        cells.values().filter(|cell| cell.initialized()).count()
    }

    /// Whether no probe has completed yet
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
