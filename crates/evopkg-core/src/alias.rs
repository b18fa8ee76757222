//! Command aliases
//!
//! An alias binds a command name to a simulated syntax. Creating one writes
//! a shim script into the bin directory that re-enters evopkg with the
//! alias name, and records the binding in a JSON registry. The registry is
//! the only source for listing; shims are never scanned.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use evopkg_pkg::{BackendKind, HostProbe, SystemProbe};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::CoreError;

/// Marker line identifying a shim evopkg owns
pub const SHIM_MARKER: &str = "# evopkg-alias:";

/// How an alias came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasKind {
    /// User-chosen name
    Custom,
    /// Simulator named after a backend grammar
    Preset,
}

/// A command name bound to a simulated syntax
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
    /// Grammar the alias accepts
    pub syntax: BackendKind,
    pub kind: AliasKind,
    /// Installed shim script
    pub shim: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    #[serde(default)]
    aliases: BTreeMap<String, Alias>,
}

/// Creates, removes, and lists aliases
pub struct AliasManager<P: HostProbe = SystemProbe> {
    registry_path: PathBuf,
    bin_dir: PathBuf,
    evopkg_exe: PathBuf,
    probe: P,
    // Serializes registry read-modify-write cycles within the process.
    lock: Mutex<()>,
}

impl AliasManager<SystemProbe> {
    /// Create a manager that resolves executables on `PATH`
    pub fn new(registry_path: impl Into<PathBuf>, bin_dir: impl Into<PathBuf>) -> Self {
        Self::with_probe(registry_path, bin_dir, SystemProbe)
    }
}

impl<P: HostProbe> AliasManager<P> {
    /// Create a manager with an explicit host probe
    pub fn with_probe(
        registry_path: impl Into<PathBuf>,
        bin_dir: impl Into<PathBuf>,
        probe: P,
    ) -> Self {
        let evopkg_exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("evopkg"));
        Self {
            registry_path: registry_path.into(),
            bin_dir: bin_dir.into(),
            evopkg_exe,
            probe,
            lock: Mutex::new(()),
        }
    }

    /// Set the evopkg executable shims re-enter
    #[must_use]
    pub fn with_evopkg_exe(mut self, exe: impl Into<PathBuf>) -> Self {
        self.evopkg_exe = exe.into();
        self
    }

    /// Directory shims are written to
    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// Create a custom alias
    ///
    /// # Errors
    /// Returns `InvalidAliasName` for names that are not plain letters and
    /// digits, `ReservedName` for backend names (any case), and
    /// `AliasAlreadyExists` when an alias, file, or executable already
    /// answers to the name.
    #[instrument(skip(self), level = "debug")]
    pub fn create(&self, name: &str, syntax: BackendKind) -> Result<Alias, CoreError> {
        let name = name.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidAliasName(name.to_string()));
        }
        if BackendKind::is_reserved(name) {
            return Err(CoreError::ReservedName(name.to_string()));
        }
        self.install(name, syntax, AliasKind::Custom)
    }

    /// Install a simulator named after a backend grammar
    ///
    /// The only way to claim a reserved name. Refuses when the real
    /// executable is present, so a simulator never shadows a package
    /// manager.
    ///
    /// # Errors
    /// Returns `AliasAlreadyExists` when the backend or an alias with its
    /// name already exists.
    #[instrument(skip(self), level = "debug")]
    pub fn install_simulator(&self, syntax: BackendKind) -> Result<Alias, CoreError> {
        self.install(syntax.as_str(), syntax, AliasKind::Preset)
    }

    fn install(&self, name: &str, syntax: BackendKind, kind: AliasKind) -> Result<Alias, CoreError> {
        let _guard = self.lock.lock().map_err(|e| CoreError::Registry(e.to_string()))?;
        let mut registry = self.load()?;

        let shim = self.bin_dir.join(name);
        if registry.aliases.contains_key(name) || shim.exists() {
            return Err(CoreError::AliasAlreadyExists(name.to_string()));
        }
        if let Some(path) = self.probe.resolve(name) {
            debug!(name, path = %path.display(), "name resolves to an executable");
            return Err(CoreError::AliasAlreadyExists(name.to_string()));
        }

        write_shim(&shim, name, &self.evopkg_exe)?;

        let alias = Alias {
            name: name.to_string(),
            syntax,
            kind,
            shim: shim.clone(),
            created_at: Utc::now(),
        };
        registry.aliases.insert(name.to_string(), alias.clone());

        if let Err(e) = self.save(&registry) {
            // Keep filesystem and registry consistent.
            let _ = fs::remove_file(&shim);
            return Err(e);
        }

        info!(name, syntax = %syntax, shim = %shim.display(), "alias created");
        Ok(alias)
    }

    /// Remove an alias
    ///
    /// Removing an alias that does not exist is a successful no-op. Returns
    /// whether anything was removed.
    ///
    /// # Errors
    /// Returns an error if the registry or shim cannot be updated.
    #[instrument(skip(self), level = "debug")]
    pub fn remove(&self, name: &str) -> Result<bool, CoreError> {
        let name = name.trim();
        let _guard = self.lock.lock().map_err(|e| CoreError::Registry(e.to_string()))?;
        let mut registry = self.load()?;

        let shim = registry
            .aliases
            .get(name)
            .map_or_else(|| self.bin_dir.join(name), |alias| alias.shim.clone());
        let removed_shim = remove_shim(&shim)?;

        let removed_entry = registry.aliases.remove(name).is_some();
        if removed_entry {
            self.save(&registry)?;
        }

        if removed_entry || removed_shim {
            info!(name, "alias removed");
        } else {
            debug!(name, "no such alias, nothing to remove");
        }
        Ok(removed_entry || removed_shim)
    }

    /// Every alias, ordered by name
    ///
    /// # Errors
    /// Returns `Registry` if the registry file is unreadable.
    pub fn list(&self) -> Result<Vec<Alias>, CoreError> {
        Ok(self.load()?.aliases.into_values().collect())
    }

    /// Look up one alias
    ///
    /// # Errors
    /// Returns `AliasNotFound` if no alias has that name.
    pub fn lookup(&self, name: &str) -> Result<Alias, CoreError> {
        self.load()?
            .aliases
            .remove(name.trim())
            .ok_or_else(|| CoreError::AliasNotFound(name.trim().to_string()))
    }

    fn load(&self) -> Result<Registry, CoreError> {
        let content = match fs::read_to_string(&self.registry_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Registry::default()),
            Err(e) => {
                return Err(CoreError::Registry(format!(
                    "{}: {e}",
                    self.registry_path.display()
                )));
            }
        };
        serde_json::from_str(&content)
            .map_err(|e| CoreError::Registry(format!("{}: {e}", self.registry_path.display())))
    }

    fn save(&self, registry: &Registry) -> Result<(), CoreError> {
        let dir = self.registry_path.parent().ok_or_else(|| {
            CoreError::Registry(format!(
                "registry path has no parent directory: {}",
                self.registry_path.display()
            ))
        })?;
        fs::create_dir_all(dir)?;

        let content = serde_json::to_string_pretty(registry)
            .map_err(|e| CoreError::Registry(e.to_string()))?;

        let tmp_path = self.registry_path.with_extension("json.tmp");
        let mut tmp_file = fs::File::create(&tmp_path)?;
        tmp_file.write_all(content.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.registry_path)?;
        debug!(path = %self.registry_path.display(), aliases = registry.aliases.len(), "registry saved");
        Ok(())
    }
}

/// Shim script that re-enters evopkg as `name`
#[must_use]
pub fn shim_script(name: &str, evopkg_exe: &Path) -> String {
    let exe = evopkg_exe.display().to_string().replace('\'', r"'\''");
    format!("#!/bin/sh\n{SHIM_MARKER} {name}\nexec '{exe}' shim '{name}' \"$@\"\n")
}

fn write_shim(path: &Path, name: &str, evopkg_exe: &Path) -> Result<(), CoreError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, shim_script(name, evopkg_exe))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

/// Delete a shim if it is one of ours; foreign files are left alone
fn remove_shim(path: &Path) -> Result<bool, CoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        // Binary or unreadable: not a shim we wrote.
        Err(e) => {
            warn!(path = %path.display(), error = %e, "leaving unreadable file in place");
            return Ok(false);
        }
    };
    if !content.lines().any(|line| line.starts_with(SHIM_MARKER)) {
        warn!(path = %path.display(), "not an evopkg shim, leaving it in place");
        return Ok(false);
    }
    fs::remove_file(path)?;
    Ok(true)
}
