//! Type definitions for package management

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PackageError;

/// Native package manager kind
///
/// Declaration order is the fixed backend ordering used for every
/// deterministic listing (detection, comparison cells).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// pacman (Arch Linux)
    Pacman,
    /// paru (AUR helper)
    Paru,
    /// yay (AUR helper)
    Yay,
    /// APT (Debian/Ubuntu)
    Apt,
    /// DNF (Fedora/RHEL)
    Dnf,
    /// zypper (openSUSE)
    Zypper,
    /// Snap
    Snap,
    /// Flatpak
    Flatpak,
}

impl BackendKind {
    /// Every known backend, in fixed order
    pub const ALL: [BackendKind; 8] = [
        BackendKind::Pacman,
        BackendKind::Paru,
        BackendKind::Yay,
        BackendKind::Apt,
        BackendKind::Dnf,
        BackendKind::Zypper,
        BackendKind::Snap,
        BackendKind::Flatpak,
    ];

    /// Canonical lowercase name (also the executable name)
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Pacman => "pacman",
            BackendKind::Paru => "paru",
            BackendKind::Yay => "yay",
            BackendKind::Apt => "apt",
            BackendKind::Dnf => "dnf",
            BackendKind::Zypper => "zypper",
            BackendKind::Snap => "snap",
            BackendKind::Flatpak => "flatpak",
        }
    }

    /// Whether the name is reserved by a backend (case-insensitive)
    #[must_use]
    pub fn is_reserved(name: &str) -> bool {
        name.parse::<BackendKind>().is_ok()
    }

    /// Distro family this backend is bound to, if any
    #[must_use]
    pub fn family(self) -> Option<DistroFamily> {
        match self {
            BackendKind::Pacman | BackendKind::Paru | BackendKind::Yay => Some(DistroFamily::Arch),
            BackendKind::Apt => Some(DistroFamily::Debian),
            BackendKind::Dnf => Some(DistroFamily::Fedora),
            BackendKind::Zypper => Some(DistroFamily::OpenSuse),
            BackendKind::Snap | BackendKind::Flatpak => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| PackageError::UnknownBackend(s.to_string()))
    }
}

/// Uniform package operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Install packages
    Install,
    /// Remove packages
    Remove,
    /// Search repositories
    Search,
    /// Show package information
    Info,
    /// Synchronize package metadata
    Refresh,
    /// Upgrade the whole system
    Upgrade,
    /// Clean caches / orphans
    Clean,
    /// List installed packages
    List,
    /// List files owned by a package
    ListFiles,
}

impl Operation {
    /// Every operation
    pub const ALL: [Operation; 9] = [
        Operation::Install,
        Operation::Remove,
        Operation::Search,
        Operation::Info,
        Operation::Refresh,
        Operation::Upgrade,
        Operation::Clean,
        Operation::List,
        Operation::ListFiles,
    ];

    /// Operations that take package names
    #[must_use]
    pub fn takes_packages(self) -> bool {
        matches!(
            self,
            Operation::Install
                | Operation::Remove
                | Operation::Search
                | Operation::Info
                | Operation::ListFiles
        )
    }

    /// Operations routed to the backend that carries the packages
    #[must_use]
    pub fn selects_repository(self) -> bool {
        matches!(self, Operation::Install | Operation::Remove | Operation::Info)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Install => "install",
            Operation::Remove => "remove",
            Operation::Search => "search",
            Operation::Info => "info",
            Operation::Refresh => "refresh",
            Operation::Upgrade => "upgrade",
            Operation::Clean => "clean",
            Operation::List => "list",
            Operation::ListFiles => "list-files",
        };
        f.write_str(name)
    }
}

/// Distribution family inferred from os-release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistroFamily {
    Arch,
    Debian,
    Fedora,
    OpenSuse,
}

impl DistroFamily {
    /// The family's native backend
    #[must_use]
    pub fn native_backend(self) -> BackendKind {
        match self {
            DistroFamily::Arch => BackendKind::Pacman,
            DistroFamily::Debian => BackendKind::Apt,
            DistroFamily::Fedora => BackendKind::Dnf,
            DistroFamily::OpenSuse => BackendKind::Zypper,
        }
    }
}

impl fmt::Display for DistroFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistroFamily::Arch => "Arch Linux",
            DistroFamily::Debian => "Debian",
            DistroFamily::Fedora => "Fedora",
            DistroFamily::OpenSuse => "openSUSE",
        };
        f.write_str(name)
    }
}

/// Attributes parsed from a backend's info output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDetails {
    pub version: Option<String>,
    pub size: Option<String>,
    pub description: Option<String>,
    pub dependencies: Vec<String>,
}

impl PackageDetails {
    /// True when nothing useful was parsed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.version.is_none()
            && self.size.is_none()
            && self.description.is_none()
            && self.dependencies.is_empty()
    }
}

/// Why a sub-query degraded to `found = false`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryFailure {
    /// Backend did not answer in time
    Timeout,
    /// User cancelled the query
    Interrupted,
    /// Backend ran and failed
    NonZeroExit { status: i32, stderr: String },
    /// Backend output did not have the expected shape
    ParseFailure { reason: String },
    /// Backend could not be started at all
    Unavailable { reason: String },
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryFailure::Timeout => f.write_str("timeout"),
            QueryFailure::Interrupted => f.write_str("interrupted"),
            QueryFailure::NonZeroExit { status, stderr } => match stderr.lines().next() {
                Some(line) if !line.trim().is_empty() => {
                    write!(f, "exit status {status}: {}", line.trim())
                }
                _ => write!(f, "exit status {status}"),
            },
            QueryFailure::ParseFailure { reason } => write!(f, "unparseable output: {reason}"),
            QueryFailure::Unavailable { reason } => write!(f, "unavailable: {reason}"),
        }
    }
}

/// One backend's answer for one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Backend that answered
    pub backend: BackendKind,
    /// Package name as requested
    pub package: String,
    /// Whether the backend carries the package
    pub found: bool,
    /// Backend-side name when it differs (Flatpak application ID)
    pub resolved_name: Option<String>,
    /// Closest backend-side match when the requested name was not found
    pub suggestion: Option<String>,
    pub version: Option<String>,
    pub size: Option<String>,
    pub description: Option<String>,
    pub dependencies: Vec<String>,
    /// Failure reason when the query degraded
    pub failure: Option<QueryFailure>,
    /// Raw backend output kept for diagnostics on parse failures
    pub raw_output: Option<String>,
}

impl QueryResult {
    /// Result for a package the backend carries
    pub fn found(backend: BackendKind, package: impl Into<String>, details: PackageDetails) -> Self {
        Self {
            backend,
            package: package.into(),
            found: true,
            resolved_name: None,
            suggestion: None,
            version: details.version,
            size: details.size,
            description: details.description,
            dependencies: details.dependencies,
            failure: None,
            raw_output: None,
        }
    }

    /// Result for a package the backend does not carry
    pub fn not_found(backend: BackendKind, package: impl Into<String>) -> Self {
        Self {
            backend,
            package: package.into(),
            found: false,
            resolved_name: None,
            suggestion: None,
            version: None,
            size: None,
            description: None,
            dependencies: Vec::new(),
            failure: None,
            raw_output: None,
        }
    }

    /// Degraded result carrying a failure reason
    pub fn failed(backend: BackendKind, package: impl Into<String>, failure: QueryFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::not_found(backend, package)
        }
    }

    /// Set the backend-side name
    #[must_use]
    pub fn with_resolved_name(mut self, name: Option<String>) -> Self {
        self.resolved_name = name;
        self
    }

    /// Set a suggestion
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }

    /// Keep raw output for diagnostics
    #[must_use]
    pub fn with_raw_output(mut self, raw: impl Into<String>) -> Self {
        self.raw_output = Some(raw.into());
        self
    }

    /// Parsed attributes of this result
    #[must_use]
    pub fn details(&self) -> PackageDetails {
        PackageDetails {
            version: self.version.clone(),
            size: self.size.clone(),
            description: self.description.clone(),
            dependencies: self.dependencies.clone(),
        }
    }
}

/// One cell of a comparison row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CellStatus {
    /// Backend carries the package
    Found {
        resolved_name: Option<String>,
        details: PackageDetails,
    },
    /// Backend answered and does not carry the package
    NotFound { suggestion: Option<String> },
    /// Backend could not answer
    Failed { failure: QueryFailure },
}

/// A backend's entry in a comparison row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonCell {
    pub backend: BackendKind,
    #[serde(flatten)]
    pub status: CellStatus,
}

/// One package joined across every requested backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub package: String,
    /// One cell per requested backend, in fixed backend order
    pub cells: Vec<ComparisonCell>,
}

impl ComparisonRow {
    /// Cell for one backend
    #[must_use]
    pub fn cell(&self, backend: BackendKind) -> Option<&ComparisonCell> {
        self.cells.iter().find(|c| c.backend == backend)
    }

    /// Whether any backend carries the package
    #[must_use]
    pub fn found_anywhere(&self) -> bool {
        self.cells
            .iter()
            .any(|c| matches!(c.status, CellStatus::Found { .. }))
    }
}
