//! Concurrent repository queries
//!
//! Every `(package, backend)` pair runs as its own task. A task checks the
//! existence cache, probes the backend's search listing on a miss, fetches
//! details for a hit, and returns a [`QueryResult`]. Timeouts and
//! interruptions degrade one result; they never abort its siblings.

use std::sync::Arc;
use std::time::Duration;

use evopkg_exec::{Dispatcher, ExecError};
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{CacheEntry, ExistenceCache};
use crate::descriptor::{Backend, BackendTable};
use crate::parse::{Existence, find_in_search, parse_details};
use crate::types::{BackendKind, QueryFailure, QueryResult};

/// Default deadline for a search probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for a details lookup
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Per-call query options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Bypass the existence cache and probe again
    pub refresh: bool,
}

impl QueryOptions {
    /// Options that bypass the cache
    #[must_use]
    pub fn refresh() -> Self {
        Self { refresh: true }
    }
}

/// Why a lookup could not produce a cacheable entry
#[derive(Debug, Clone)]
struct Degraded {
    failure: QueryFailure,
    raw_output: Option<String>,
}

impl From<ExecError> for Degraded {
    fn from(err: ExecError) -> Self {
        let failure = match err {
            ExecError::Timeout { .. } => QueryFailure::Timeout,
            ExecError::Interrupted => QueryFailure::Interrupted,
            ExecError::NonZeroExit { status, stderr, .. } => {
                QueryFailure::NonZeroExit { status, stderr }
            }
            other => QueryFailure::Unavailable {
                reason: other.to_string(),
            },
        };
        Self {
            failure,
            raw_output: None,
        }
    }
}

/// Runs backend queries concurrently against a shared cache
#[derive(Clone)]
pub struct QueryEngine {
    dispatcher: Arc<dyn Dispatcher>,
    table: Arc<BackendTable>,
    cache: Arc<ExistenceCache>,
    probe_timeout: Duration,
    query_timeout: Duration,
}

impl QueryEngine {
    /// Create a query engine
    ///
    /// # Arguments
    /// * `dispatcher` - Runs the search and details commands
    /// * `table` - Backend descriptors
    /// * `cache` - Existence cache shared with other engines
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        table: Arc<BackendTable>,
        cache: Arc<ExistenceCache>,
    ) -> Self {
        Self {
            dispatcher,
            table,
            cache,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Set the search probe deadline
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the details lookup deadline
    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// The cache this engine reads and writes
    pub fn cache(&self) -> &Arc<ExistenceCache> {
        &self.cache
    }

    /// Query one package across a set of backends
    pub async fn query_all(&self, package: &str, backends: &[BackendKind]) -> Vec<QueryResult> {
        self.query_many(&[package], backends, QueryOptions::default())
            .await
    }

    /// Query every package across a set of backends
    ///
    /// Returns one result per distinct `(package, backend)` pair once every
    /// task has finished, in package order then backend order as given.
    #[instrument(skip_all, fields(packages = packages.len(), backends = backends.len()))]
    pub async fn query_many<S: AsRef<str>>(
        &self,
        packages: &[S],
        backends: &[BackendKind],
        options: QueryOptions,
    ) -> Vec<QueryResult> {
        let pairs = distinct_pairs(packages, backends);
        info!(queries = pairs.len(), refresh = options.refresh, "querying repositories");

        let mut handles = Vec::with_capacity(pairs.len());
        for (package, backend) in pairs {
            let engine = self.clone();
            let task_package = package.clone();
            let handle = tokio::spawn(async move {
                engine.query_one(backend, &task_package, options).await
            });
            handles.push((package, backend, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (package, backend, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(backend = %backend, package = %package, error = %e, "query task failed");
                    results.push(QueryResult::failed(
                        backend,
                        package,
                        QueryFailure::Unavailable {
                            reason: e.to_string(),
                        },
                    ));
                }
            }
        }
        results
    }

    /// Query one package in one backend
    #[instrument(skip(self), level = "debug")]
    pub async fn query_one(
        &self,
        backend: BackendKind,
        package: &str,
        options: QueryOptions,
    ) -> QueryResult {
        if options.refresh {
            self.cache.invalidate(backend, package).await;
        }

        let descriptor = self.table.describe(backend);
        let outcome = self
            .cache
            .get_or_probe(backend, package, || self.lookup(descriptor, package))
            .await;

        match outcome {
            Ok(entry) if entry.exists => {
                QueryResult::found(backend, package, entry.details)
                    .with_resolved_name(entry.resolved_name)
            }
            Ok(entry) => {
                QueryResult::not_found(backend, package).with_suggestion(entry.suggestion)
            }
            Err(degraded) => {
                warn!(backend = %backend, package, failure = %degraded.failure, "query degraded");
                let result = QueryResult::failed(backend, package, degraded.failure);
                match degraded.raw_output {
                    Some(raw) => result.with_raw_output(raw),
                    None => result,
                }
            }
        }
    }

    async fn lookup(&self, backend: &Backend, package: &str) -> Result<CacheEntry, Degraded> {
        let search = backend.search_command(package);
        let listing = match self
            .dispatcher
            .run_with_timeout(&search, self.probe_timeout)
            .await
        {
            Ok(result) => result.stdout,
            Err(ExecError::NonZeroExit { status, stderr, .. })
                if backend.is_no_match(status, &stderr) =>
            {
                debug!(backend = %backend.kind, package, status, "search reported no match");
                return Ok(CacheEntry::missing(None));
            }
            Err(e) => return Err(e.into()),
        };

        let (resolved_name, listed) = match find_in_search(backend.parse, package, &listing) {
            Existence::Missing { suggestion } => return Ok(CacheEntry::missing(suggestion)),
            Existence::Found {
                resolved_name,
                listing,
            } => (resolved_name, listing),
        };

        let name = resolved_name.as_deref().unwrap_or(package);
        let Some(details_cmd) = backend.details_command(name) else {
            return Ok(CacheEntry::found(resolved_name, listed.unwrap_or_default()));
        };

        let output = self
            .dispatcher
            .run_with_timeout(&details_cmd, self.query_timeout)
            .await?
            .stdout;

        match parse_details(backend.parse, backend.kind, &output) {
            Ok(details) => Ok(CacheEntry::found(resolved_name, details)),
            Err(e) => Err(Degraded {
                failure: QueryFailure::ParseFailure {
                    reason: e.to_string(),
                },
                raw_output: Some(output),
            }),
        }
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("dispatcher", &self.dispatcher.dispatcher_type())
            .field("probe_timeout", &self.probe_timeout)
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

fn distinct_pairs<S: AsRef<str>>(
    packages: &[S],
    backends: &[BackendKind],
) -> Vec<(String, BackendKind)> {
    let mut pairs: Vec<(String, BackendKind)> = Vec::new();
    for package in packages {
        let package = package.as_ref().trim();
        if package.is_empty() {
            continue;
        }
        for backend in backends {
            if !pairs.iter().any(|(p, b)| p == package && b == backend) {
                pairs.push((package.to_string(), *backend));
            }
        }
    }
    pairs
}
