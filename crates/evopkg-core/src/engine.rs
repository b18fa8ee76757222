//! Engine facade
//!
//! The single entry point the presentation layer talks to. It owns the
//! backend table, the existence cache, the dispatcher, and the alias
//! manager, and returns structured values only.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use evopkg_exec::{Command, CommandResult, Dispatcher, ExecError, Interrupt, LocalDispatcher};
use evopkg_pkg::{
    BackendKind, BackendTable, ComparisonRow, DetectedEnvironment, Detector, ExistenceCache,
    HostProbe, Operation, PackageError, QueryEngine, QueryFailure, QueryOptions, QueryResult,
    SystemProbe,
    Translator, parse_verb,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::alias::{Alias, AliasManager};
use crate::config::EvopkgConfig;
use crate::error::CoreError;

/// A translated command and how it was chosen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Grammar the user typed
    pub syntax: BackendKind,
    /// Backend that runs the command
    pub target: BackendKind,
    pub operation: Operation,
    pub command: Command,
}

/// Which requested packages one backend carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub backend: BackendKind,
    /// Packages the backend carries, in request order
    pub available: Vec<String>,
    /// Packages the backend answered "no" for
    pub missing: Vec<String>,
    /// Packages whose query degraded
    pub failed: Vec<String>,
    /// Backend-side names of found packages, when they differ
    pub resolved: BTreeMap<String, String>,
    /// Closest backend-side names of missing packages
    pub suggestions: BTreeMap<String, String>,
}

impl Location {
    /// Rewrite requested names to the backend's own names
    #[must_use]
    pub fn backend_names(&self, packages: &[String]) -> Vec<String> {
        packages
            .iter()
            .map(|p| self.resolved.get(p).unwrap_or(p).clone())
            .collect()
    }

    /// Whether the backend carries every requested package
    #[must_use]
    pub fn carries_all(&self) -> bool {
        !self.available.is_empty() && self.missing.is_empty() && self.failed.is_empty()
    }
}

/// Orchestrates detection, translation, dispatch, queries, and aliases
pub struct Engine {
    config: EvopkgConfig,
    table: Arc<BackendTable>,
    dispatcher: Arc<dyn Dispatcher>,
    probe: Arc<dyn HostProbe>,
    translator: Translator,
    queries: QueryEngine,
    aliases: AliasManager<Arc<dyn HostProbe>>,
    environment: OnceLock<DetectedEnvironment>,
}

impl Engine {
    /// Engine for the real host
    ///
    /// Commands run locally with the configured elevation program and stop
    /// when `interrupt` is triggered.
    pub fn from_config(config: EvopkgConfig, interrupt: Interrupt) -> Self {
        let dispatcher = LocalDispatcher::new()
            .with_elevation(config.elevation())
            .with_timeout(config.query_timeout())
            .with_interrupt(interrupt);
        Self::new(config, Arc::new(dispatcher), Arc::new(SystemProbe))
    }

    /// Engine with injected dispatcher and host probe
    pub fn new(
        config: EvopkgConfig,
        dispatcher: Arc<dyn Dispatcher>,
        probe: Arc<dyn HostProbe>,
    ) -> Self {
        let table = Arc::new(BackendTable::builtin());
        let queries = QueryEngine::new(
            Arc::clone(&dispatcher),
            Arc::clone(&table),
            Arc::new(ExistenceCache::new()),
        )
        .with_probe_timeout(config.probe_timeout())
        .with_query_timeout(config.query_timeout());
        let aliases = AliasManager::with_probe(
            config.registry_path.clone(),
            config.bin_dir.clone(),
            Arc::clone(&probe),
        );

        Self {
            translator: Translator::new(Arc::clone(&table)),
            config,
            table,
            dispatcher,
            probe,
            queries,
            aliases,
            environment: OnceLock::new(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EvopkgConfig {
        &self.config
    }

    /// Backend descriptors
    pub fn table(&self) -> &BackendTable {
        &self.table
    }

    /// Alias manager
    pub fn aliases(&self) -> &AliasManager<Arc<dyn HostProbe>> {
        &self.aliases
    }

    /// Probe the host for backends
    pub fn detect(&self) -> DetectedEnvironment {
        Detector::with_probe(Arc::clone(&self.probe))
            .with_os_release(self.config.os_release_path.clone())
            .detect(&self.table)
    }

    /// Detected environment, probed once per engine
    pub fn environment(&self) -> &DetectedEnvironment {
        self.environment.get_or_init(|| self.detect())
    }

    /// Present backends to query: the requested ones, or all detected
    ///
    /// # Errors
    /// Returns `BackendNotDetected` if a requested backend is absent or the
    /// host has none at all.
    pub fn requested_backends(
        &self,
        backends: &[BackendKind],
    ) -> Result<Vec<BackendKind>, CoreError> {
        let env = self.environment();
        if env.is_empty() {
            let err = PackageError::BackendNotDetected("no package manager found".to_string());
            return Err(err.into());
        }
        if backends.is_empty() {
            return Ok(env.kinds());
        }

        let mut kinds = Vec::with_capacity(backends.len());
        for kind in backends {
            env.require(*kind)?;
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds.sort();
        Ok(kinds)
    }

    /// Concrete command for an operation typed in `syntax`, run by `target`
    ///
    /// # Errors
    /// Returns `UnsupportedOperation` or `MissingPackages` from translation.
    pub fn translate<S: AsRef<str>>(
        &self,
        operation: Operation,
        syntax: BackendKind,
        target: BackendKind,
        args: &[S],
    ) -> Result<Command, CoreError> {
        Ok(self.translator.translate(operation, syntax, target, args)?)
    }

    /// Translate an operation using the grammar an alias is bound to
    ///
    /// # Errors
    /// Returns `AliasNotFound` for unknown aliases, plus translation errors.
    pub fn translate_for_alias<S: AsRef<str>>(
        &self,
        alias: &str,
        operation: Operation,
        target: BackendKind,
        args: &[S],
    ) -> Result<Command, CoreError> {
        let alias = self.aliases.lookup(alias)?;
        self.translate(operation, alias.syntax, target, args)
    }

    /// Parse a verb and pick the backend that should run it
    ///
    /// With no explicit backend, install, remove, and info go to the backend
    /// chosen by [`Engine::choose_backend`] under that backend's own package
    /// names, and everything else to the native one.
    ///
    /// # Errors
    /// Returns `UnknownVerb`, `BackendNotDetected`, `PackageNotFound`, a
    /// translation error, or `Interrupted` if locating was cancelled.
    #[instrument(skip(self, args), level = "debug")]
    pub async fn prepare(
        &self,
        syntax: BackendKind,
        verb: &str,
        args: &[String],
        backend: Option<BackendKind>,
    ) -> Result<Invocation, CoreError> {
        let operation = parse_verb(syntax, verb)?;
        let (target, location) = self.resolve_target(operation, args, backend).await?;
        let args = match &location {
            Some(location) => location.backend_names(args),
            None => args.to_vec(),
        };
        let command = self.translate(operation, syntax, target, &args)?;
        debug!(command = %command, "prepared invocation");
        Ok(Invocation {
            syntax,
            target,
            operation,
            command,
        })
    }

    async fn resolve_target(
        &self,
        operation: Operation,
        args: &[String],
        backend: Option<BackendKind>,
    ) -> Result<(BackendKind, Option<Location>), CoreError> {
        let env = self.environment();
        if let Some(kind) = backend {
            return Ok((env.require(kind)?.kind, None));
        }
        let native = env.require_native()?;
        if !operation.selects_repository() || args.is_empty() || env.backends.len() == 1 {
            return Ok((native, None));
        }

        let backends = self.requested_backends(&[])?;
        let results = self
            .queries
            .query_many(args, &backends, QueryOptions::default())
            .await;
        if results
            .iter()
            .any(|r| r.failure == Some(QueryFailure::Interrupted))
        {
            return Err(ExecError::Interrupted.into());
        }

        let located = locations(&backends, &results);
        let chosen = self.choose_backend(&located, args)?;
        let location = located.into_iter().find(|l| l.backend == chosen);
        Ok((chosen, location))
    }

    /// Backend to run `packages` on, given where they were located
    ///
    /// # Errors
    /// Returns `PackageNotFound` if no single backend carries them all.
    pub fn choose_backend<S: AsRef<str>>(
        &self,
        locations: &[Location],
        packages: &[S],
    ) -> Result<BackendKind, CoreError> {
        let chosen = choose_backend(locations, self.environment().native(), packages)?;
        info!(backend = %chosen, "selected repository");
        Ok(chosen)
    }

    /// Dispatch a prepared command
    ///
    /// # Errors
    /// Returns the dispatch error wrapped as a package error.
    pub async fn run(&self, command: &Command) -> Result<CommandResult, CoreError> {
        info!(command = %command, "running backend command");
        Ok(self
            .dispatcher
            .run_with_timeout(command, self.config.run_timeout())
            .await?)
    }

    /// Prepare and run a verb in one step
    ///
    /// # Errors
    /// Returns any error of [`Engine::prepare`] or [`Engine::run`].
    pub async fn execute(
        &self,
        syntax: BackendKind,
        verb: &str,
        args: &[String],
        backend: Option<BackendKind>,
    ) -> Result<CommandResult, CoreError> {
        let invocation = self.prepare(syntax, verb, args, backend).await?;
        self.run(&invocation.command).await
    }

    /// Run the arguments an alias shim received
    ///
    /// # Errors
    /// Returns `AliasNotFound`, `UnknownVerb` when no verb was given, or any
    /// error of [`Engine::execute`].
    pub async fn run_alias(&self, name: &str, argv: &[String]) -> Result<CommandResult, CoreError> {
        let alias = self.aliases.lookup(name)?;
        let (verb, args) = argv.split_first().ok_or_else(|| PackageError::UnknownVerb {
            syntax: alias.syntax,
            verb: String::new(),
        })?;
        debug!(alias = %alias.name, syntax = %alias.syntax, verb, "alias invoked");
        self.execute(alias.syntax, verb, args, None).await
    }

    /// Query one package across backends
    pub async fn query_all(&self, package: &str, backends: &[BackendKind]) -> Vec<QueryResult> {
        self.queries.query_all(package, backends).await
    }

    /// Compare packages across backends (all detected ones when empty)
    ///
    /// # Errors
    /// Returns `BackendNotDetected` if a requested backend is absent.
    #[instrument(skip(self), level = "debug")]
    pub async fn compare(
        &self,
        packages: &[String],
        backends: &[BackendKind],
        refresh: bool,
    ) -> Result<Vec<ComparisonRow>, CoreError> {
        let backends = self.requested_backends(backends)?;
        let options = QueryOptions { refresh };
        let results = self.queries.query_many(packages, &backends, options).await;
        Ok(evopkg_pkg::compare(packages, &backends, &results))
    }

    /// Which backends carry the requested packages
    ///
    /// # Errors
    /// Returns `BackendNotDetected` if a requested backend is absent.
    #[instrument(skip(self), level = "debug")]
    pub async fn locate(
        &self,
        packages: &[String],
        backends: &[BackendKind],
    ) -> Result<Vec<Location>, CoreError> {
        let backends = self.requested_backends(backends)?;
        let results = self
            .queries
            .query_many(packages, &backends, QueryOptions::default())
            .await;

        Ok(locations(&backends, &results))
    }

    /// Create a custom alias
    ///
    /// # Errors
    /// See [`AliasManager::create`].
    pub fn create_alias(&self, name: &str, syntax: BackendKind) -> Result<Alias, CoreError> {
        self.aliases.create(name, syntax)
    }

    /// Remove an alias; removing an unknown alias succeeds
    ///
    /// # Errors
    /// See [`AliasManager::remove`].
    pub fn remove_alias(&self, name: &str) -> Result<bool, CoreError> {
        self.aliases.remove(name)
    }

    /// Every alias
    ///
    /// # Errors
    /// See [`AliasManager::list`].
    pub fn list_aliases(&self) -> Result<Vec<Alias>, CoreError> {
        self.aliases.list()
    }

    /// Install a simulator named after a backend grammar
    ///
    /// # Errors
    /// See [`AliasManager::install_simulator`].
    pub fn install_simulator(&self, syntax: BackendKind) -> Result<Alias, CoreError> {
        self.aliases.install_simulator(syntax)
    }
}

/// Group query results into one [`Location`] per backend
fn locations(backends: &[BackendKind], results: &[QueryResult]) -> Vec<Location> {
    backends
        .iter()
        .map(|backend| {
            let mut location = Location {
                backend: *backend,
                available: Vec::new(),
                missing: Vec::new(),
                failed: Vec::new(),
                resolved: BTreeMap::new(),
                suggestions: BTreeMap::new(),
            };
            for result in results.iter().filter(|r| r.backend == *backend) {
                if let Some(name) = &result.resolved_name {
                    location.resolved.insert(result.package.clone(), name.clone());
                }
                if let Some(name) = &result.suggestion {
                    location.suggestions.insert(result.package.clone(), name.clone());
                }
                if result.found {
                    location.available.push(result.package.clone());
                } else if result.failure.is_some() {
                    location.failed.push(result.package.clone());
                } else {
                    location.missing.push(result.package.clone());
                }
            }
            location
        })
        .collect()
}

/// Pick the backend an operation on `packages` should run on
///
/// Prefers `native` when it carries every package, else the first backend
/// in fixed order that does.
///
/// # Errors
/// Returns `PackageNotFound` naming the packages no single backend carries.
pub fn choose_backend<S: AsRef<str>>(
    locations: &[Location],
    native: Option<BackendKind>,
    packages: &[S],
) -> Result<BackendKind, PackageError> {
    if let Some(native) = native
        && locations.iter().any(|l| l.backend == native && l.carries_all())
    {
        return Ok(native);
    }

    let mut complete: Vec<BackendKind> = locations
        .iter()
        .filter(|l| l.carries_all())
        .map(|l| l.backend)
        .collect();
    complete.sort();
    if let Some(first) = complete.first() {
        return Ok(*first);
    }

    let requested: Vec<&str> = packages.iter().map(|p| p.as_ref()).collect();
    let unavailable: Vec<&str> = requested
        .iter()
        .copied()
        .filter(|p| !locations.iter().any(|l| l.available.iter().any(|a| a == p)))
        .collect();
    let names = if unavailable.is_empty() {
        requested.join(", ")
    } else {
        unavailable.join(", ")
    };
    Err(PackageError::PackageNotFound(names))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(backend: BackendKind, available: &[&str], missing: &[&str]) -> Location {
        Location {
            backend,
            available: available.iter().map(ToString::to_string).collect(),
            missing: missing.iter().map(ToString::to_string).collect(),
            failed: Vec::new(),
            resolved: BTreeMap::new(),
            suggestions: BTreeMap::new(),
        }
    }

    #[test]
    fn test_native_preferred_when_complete() {
        let locations = vec![
            location(BackendKind::Apt, &["vim"], &[]),
            location(BackendKind::Snap, &["vim"], &[]),
        ];
        let chosen = choose_backend(&locations, Some(BackendKind::Apt), &["vim"]).unwrap();
        assert_eq!(chosen, BackendKind::Apt);
    }

    #[test]
    fn test_falls_back_to_fixed_order() {
        let locations = vec![
            location(BackendKind::Flatpak, &["spotify"], &[]),
            location(BackendKind::Apt, &[], &["spotify"]),
            location(BackendKind::Snap, &["spotify"], &[]),
        ];
        let chosen = choose_backend(&locations, Some(BackendKind::Apt), &["spotify"]).unwrap();
        assert_eq!(chosen, BackendKind::Snap);
    }

    #[test]
    fn test_nothing_carries_everything() {
        let locations = vec![
            location(BackendKind::Pacman, &["vim"], &["spotify"]),
            location(BackendKind::Flatpak, &["spotify"], &["vim"]),
        ];
        let err = choose_backend(&locations, Some(BackendKind::Pacman), &["vim", "spotify"])
            .unwrap_err();
        assert_eq!(err, PackageError::PackageNotFound("vim, spotify".to_string()));

        let locations = vec![location(BackendKind::Pacman, &[], &["nope"])];
        let err = choose_backend(&locations, None, &["nope"]).unwrap_err();
        assert_eq!(err, PackageError::PackageNotFound("nope".to_string()));
    }
}
