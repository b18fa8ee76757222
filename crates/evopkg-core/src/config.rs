//! Configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CoreError;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "EVOPKG_CONFIG";

/// Top-level evopkg configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvopkgConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Privilege escalation program; empty disables elevation
    pub elevation: String,
    /// Deadline for search probes, in seconds
    pub probe_timeout_secs: u64,
    /// Deadline for details lookups and other captured calls, in seconds
    pub query_timeout_secs: u64,
    /// Deadline for interactive operations (install, upgrade, ...), in seconds
    pub run_timeout_secs: u64,
    /// Directory alias shims are installed into
    pub bin_dir: PathBuf,
    /// Alias registry file
    pub registry_path: PathBuf,
    /// os-release file used for distro detection
    pub os_release_path: PathBuf,
}

impl Default for EvopkgConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            elevation: "sudo".to_string(),
            probe_timeout_secs: 10,
            query_timeout_secs: 15,
            run_timeout_secs: 3600,
            bin_dir: PathBuf::from("/usr/local/bin"),
            registry_path: default_registry_path(),
            os_release_path: PathBuf::from(evopkg_pkg::detect::OS_RELEASE_PATH),
        }
    }
}

fn default_registry_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("evopkg/aliases.json")
}

impl EvopkgConfig {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        let config: EvopkgConfig = toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Load from default paths or use defaults
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be read or parsed
    pub fn load_default() -> Result<Self, CoreError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }

        for path in Self::search_paths() {
            if path.exists() {
                return Self::load(&path);
            }
        }

        warn!("no config file found, using defaults");
        Ok(EvopkgConfig::default())
    }

    /// Candidate config files in lookup order
    #[must_use]
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("evopkg.toml"),
            PathBuf::from("/etc/evopkg/evopkg.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("evopkg/evopkg.toml"));
        }
        paths
    }

    /// Elevation program, if elevation is enabled
    #[must_use]
    pub fn elevation(&self) -> Option<String> {
        let program = self.elevation.trim();
        (!program.is_empty()).then(|| program.to_string())
    }

    /// Search probe deadline
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Details lookup deadline
    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Interactive operation deadline
    #[must_use]
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"debug\"\nelevation = \"\"\nprobe_timeout_secs = 3").unwrap();

        let config = EvopkgConfig::load(file.path()).unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.elevation(), None);
        assert_eq!(config.probe_timeout(), Duration::from_secs(3));
        assert_eq!(config.query_timeout(), Duration::from_secs(15));
        assert_eq!(config.bin_dir, PathBuf::from("/usr/local/bin"));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "probe_timeout_secs = \"soon\"").unwrap();

        let err = EvopkgConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_default_elevation_is_sudo() {
        assert_eq!(EvopkgConfig::default().elevation().as_deref(), Some("sudo"));
    }
}
