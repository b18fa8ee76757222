//! Backend detection
//!
//! Read-only probing of the host: which package managers are resolvable and
//! which distro family the host belongs to. A failed probe only means the
//! backend is absent; detection itself never fails.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::descriptor::BackendTable;
use crate::error::PackageError;
use crate::types::{BackendKind, DistroFamily};

/// Default os-release location
pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// How detection looks at the host
pub trait HostProbe: Send + Sync {
    /// Resolve an executable on `PATH`
    fn resolve(&self, executable: &str) -> Option<PathBuf>;

    /// Whether a path exists
    fn exists(&self, path: &Path) -> bool;
}

/// Probe backed by `which` and the real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn resolve(&self, executable: &str) -> Option<PathBuf> {
        which::which(executable).ok()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

impl<P: HostProbe + ?Sized> HostProbe for Arc<P> {
    fn resolve(&self, executable: &str) -> Option<PathBuf> {
        (**self).resolve(executable)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }
}

/// Fields of interest from os-release
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease {
    pub id: String,
    pub id_like: Vec<String>,
    pub name: Option<String>,
}

impl OsRelease {
    /// Parse `KEY=value` lines, stripping quotes
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let values: HashMap<&str, String> = content
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                (key.trim(), value.to_string())
            })
            .collect();

        Self {
            id: values.get("ID").cloned().unwrap_or_default().to_lowercase(),
            id_like: values
                .get("ID_LIKE")
                .map(|like| like.split_whitespace().map(str::to_lowercase).collect())
                .unwrap_or_default(),
            name: values
                .get("PRETTY_NAME")
                .or_else(|| values.get("NAME"))
                .cloned(),
        }
    }

    /// Infer the distro family
    #[must_use]
    pub fn family(&self) -> Option<DistroFamily> {
        let id = self.id.as_str();
        let like = |family: &str| self.id_like.iter().any(|l| l == family);

        if id == "arch"
            || like("arch")
            || ["manjaro", "parch", "endeavouros", "garuda", "artix"].contains(&id)
        {
            Some(DistroFamily::Arch)
        } else if id == "debian"
            || like("debian")
            || ["ubuntu", "kali", "linuxmint", "pop", "zorin", "deepin", "raspbian"].contains(&id)
        {
            Some(DistroFamily::Debian)
        } else if id == "fedora"
            || like("fedora")
            || ["centos", "rhel", "rocky", "almalinux"].contains(&id)
        {
            Some(DistroFamily::Fedora)
        } else if id.starts_with("opensuse") || id == "suse" || like("opensuse") || like("suse") {
            Some(DistroFamily::OpenSuse)
        } else {
            None
        }
    }
}

/// A backend found on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedBackend {
    pub kind: BackendKind,
    /// Resolved executable path
    pub path: PathBuf,
}

/// Backends present on this host plus the inferred distro family
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedEnvironment {
    /// Human-readable distro name from os-release
    pub distro: Option<String>,
    pub family: Option<DistroFamily>,
    /// Present backends in fixed order
    pub backends: Vec<DetectedBackend>,
}

impl DetectedEnvironment {
    /// Environment with the given backends and no distro information
    #[must_use]
    pub fn with_backends(kinds: &[BackendKind]) -> Self {
        let mut backends: Vec<DetectedBackend> = kinds
            .iter()
            .map(|kind| DetectedBackend {
                kind: *kind,
                path: PathBuf::from(kind.as_str()),
            })
            .collect();
        backends.sort_by_key(|b| b.kind);
        backends.dedup_by_key(|b| b.kind);
        Self {
            distro: None,
            family: None,
            backends,
        }
    }

    /// No backend was found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Present backend kinds in fixed order
    #[must_use]
    pub fn kinds(&self) -> Vec<BackendKind> {
        self.backends.iter().map(|b| b.kind).collect()
    }

    /// Whether a backend is present
    #[must_use]
    pub fn contains(&self, kind: BackendKind) -> bool {
        self.backends.iter().any(|b| b.kind == kind)
    }

    /// Look up a present backend
    ///
    /// # Errors
    /// Returns `BackendNotDetected` if the backend is absent.
    pub fn require(&self, kind: BackendKind) -> Result<&DetectedBackend, PackageError> {
        self.backends
            .iter()
            .find(|b| b.kind == kind)
            .ok_or_else(|| PackageError::BackendNotDetected(kind.to_string()))
    }

    /// The distro's own backend when present, else the first present one
    #[must_use]
    pub fn native(&self) -> Option<BackendKind> {
        self.family
            .map(DistroFamily::native_backend)
            .filter(|kind| self.contains(*kind))
            .or_else(|| self.backends.first().map(|b| b.kind))
    }

    /// The native backend, or `BackendNotDetected` on an empty host
    ///
    /// # Errors
    /// Returns `BackendNotDetected` when no backend is present.
    pub fn require_native(&self) -> Result<BackendKind, PackageError> {
        self.native()
            .ok_or_else(|| PackageError::BackendNotDetected("no package manager found".to_string()))
    }
}

/// Discovers which backends exist on the host
pub struct Detector<P: HostProbe = SystemProbe> {
    probe: P,
    os_release: PathBuf,
    flatpak_dirs: Vec<PathBuf>,
}

impl Detector<SystemProbe> {
    /// Detector for the real host
    #[must_use]
    pub fn new() -> Self {
        Self::with_probe(SystemProbe)
    }
}

impl Default for Detector<SystemProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: HostProbe> Detector<P> {
    /// Detector using a custom probe
    pub fn with_probe(probe: P) -> Self {
        let mut flatpak_dirs = vec![PathBuf::from("/var/lib/flatpak")];
        if let Some(home) = dirs::home_dir() {
            flatpak_dirs.push(home.join(".local/share/flatpak"));
        }
        Self {
            probe,
            os_release: PathBuf::from(OS_RELEASE_PATH),
            flatpak_dirs,
        }
    }

    /// Read os-release from another path
    #[must_use]
    pub fn with_os_release(mut self, path: impl Into<PathBuf>) -> Self {
        self.os_release = path.into();
        self
    }

    /// Replace the directories whose presence implies Flatpak
    #[must_use]
    pub fn with_flatpak_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.flatpak_dirs = dirs;
        self
    }

    /// Probe the host
    #[instrument(skip(self, table))]
    pub fn detect(&self, table: &BackendTable) -> DetectedEnvironment {
        let os = match std::fs::read_to_string(&self.os_release) {
            Ok(content) => OsRelease::parse(&content),
            Err(e) => {
                debug!(path = %self.os_release.display(), error = %e, "os-release unreadable");
                OsRelease::default()
            }
        };
        let family = os.family();

        let backends: Vec<DetectedBackend> = table
            .iter()
            .filter(|backend| match (backend.kind.family(), family) {
                // Distro-bound backends only count on their own family.
                (Some(bound), Some(host)) => bound == host,
                _ => true,
            })
            .filter_map(|backend| {
                let resolved = self.probe.resolve(backend.executable).or_else(|| {
                    (backend.kind == BackendKind::Flatpak
                        && self.flatpak_dirs.iter().any(|d| self.probe.exists(d)))
                    .then(|| PathBuf::from(backend.executable))
                });
                debug!(backend = %backend.kind, found = resolved.is_some(), "probed backend");
                resolved.map(|path| DetectedBackend {
                    kind: backend.kind,
                    path,
                })
            })
            .collect();

        let env = DetectedEnvironment {
            distro: os.name.clone(),
            family,
            backends,
        };

        if env.is_empty() {
            warn!(distro = ?env.distro, "no package manager detected");
        } else {
            info!(
                family = ?env.family,
                backends = ?env.kinds(),
                "detected package managers"
            );
        }

        env
    }
}
