//! Plain-text rendering of core results

use std::fmt::Write;

use evopkg_core::{Alias, AliasKind, Invocation, Location};
use evopkg_pkg::{CellStatus, ComparisonRow, DetectedEnvironment};

pub fn environment(env: &DetectedEnvironment) -> String {
    let mut out = String::new();
    let distro = env.distro.as_deref().unwrap_or("unknown distribution");
    match env.family {
        Some(family) => {
            let _ = writeln!(out, "{distro} ({family} family)");
        }
        None => {
            let _ = writeln!(out, "{distro}");
        }
    }

    if env.is_empty() {
        out.push_str("no package manager found\n");
        return out;
    }
    let native = env.native();
    for backend in &env.backends {
        let marker = if Some(backend.kind) == native { "*" } else { " " };
        let _ = writeln!(
            out,
            "{marker} {:<8} {}",
            backend.kind.as_str(),
            backend.path.display()
        );
    }
    out
}

pub fn comparison(rows: &[ComparisonRow]) -> String {
    let mut out = String::new();
    for row in rows {
        let _ = writeln!(out, "{}", row.package);
        for cell in &row.cells {
            let backend = cell.backend.as_str();
            match &cell.status {
                CellStatus::Found {
                    resolved_name,
                    details,
                } => {
                    let version = details.version.as_deref().unwrap_or("-");
                    let _ = write!(out, "  {backend:<8} {version:<20}");
                    if let Some(name) = resolved_name {
                        let _ = write!(out, " [{name}]");
                    }
                    if let Some(size) = &details.size {
                        let _ = write!(out, " {size}");
                    }
                    if let Some(description) = &details.description {
                        let _ = write!(out, " {description}");
                    }
                    out.push('\n');
                }
                CellStatus::NotFound { suggestion } => {
                    let _ = write!(out, "  {backend:<8} not found");
                    if let Some(name) = suggestion {
                        let _ = write!(out, " (did you mean {name}?)");
                    }
                    out.push('\n');
                }
                CellStatus::Failed { failure } => {
                    let _ = writeln!(out, "  {backend:<8} failed: {failure}");
                }
            }
        }
    }
    out
}

pub fn locations(locations: &[Location]) -> String {
    let mut out = String::new();
    for location in locations {
        let backend = location.backend.as_str();
        let marker = if location.carries_all() { "*" } else { " " };
        let _ = write!(out, "{marker} {backend:<8}");
        if !location.available.is_empty() {
            let names = location.backend_names(&location.available);
            let _ = write!(out, " has: {}", names.join(" "));
        }
        if !location.missing.is_empty() {
            out.push_str(" missing:");
            for package in &location.missing {
                let _ = write!(out, " {package}");
                if let Some(suggestion) = location.suggestions.get(package) {
                    let _ = write!(out, " (did you mean {suggestion}?)");
                }
            }
        }
        if !location.failed.is_empty() {
            let _ = write!(out, " unknown: {}", location.failed.join(" "));
        }
        out.push('\n');
    }
    out
}

pub fn aliases(aliases: &[Alias]) -> String {
    if aliases.is_empty() {
        return "no aliases\n".to_string();
    }
    aliases.iter().map(alias).collect()
}

pub fn alias(alias: &Alias) -> String {
    let kind = match alias.kind {
        AliasKind::Custom => "",
        AliasKind::Preset => " (simulator)",
    };
    format!(
        "{:<12} {} syntax{kind}  {}\n",
        alias.name,
        alias.syntax,
        alias.shim.display()
    )
}

pub fn invocation(invocation: &Invocation) -> String {
    format!("{}\n", invocation.command)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use evopkg_pkg::{BackendKind, ComparisonCell, PackageDetails, QueryFailure};

    use super::*;

    #[test]
    fn test_comparison_lists_every_cell() {
        let rows = vec![ComparisonRow {
            package: "vim".to_string(),
            cells: vec![
                ComparisonCell {
                    backend: BackendKind::Pacman,
                    status: CellStatus::Found {
                        resolved_name: None,
                        details: PackageDetails {
                            version: Some("9.1.0-1".to_string()),
                            description: Some("Vi Improved".to_string()),
                            ..PackageDetails::default()
                        },
                    },
                },
                ComparisonCell {
                    backend: BackendKind::Flatpak,
                    status: CellStatus::NotFound {
                        suggestion: Some("org.vim.Vim".to_string()),
                    },
                },
                ComparisonCell {
                    backend: BackendKind::Snap,
                    status: CellStatus::Failed {
                        failure: QueryFailure::Timeout,
                    },
                },
            ],
        }];

        let text = comparison(&rows);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "vim");
        assert!(lines[1].contains("9.1.0-1") && lines[1].contains("Vi Improved"));
        assert!(lines[2].contains("not found (did you mean org.vim.Vim?)"));
        assert!(lines[3].contains("failed: timeout"));
    }

    #[test]
    fn test_locations_mark_complete_backend() {
        let text = locations(&[Location {
            backend: BackendKind::Flatpak,
            available: vec!["spotify".to_string()],
            missing: Vec::new(),
            failed: Vec::new(),
            resolved: BTreeMap::from([(
                "spotify".to_string(),
                "com.spotify.Client".to_string(),
            )]),
            suggestions: BTreeMap::new(),
        }]);

        assert!(text.starts_with("* flatpak"));
        assert!(text.contains("has: com.spotify.Client"));
    }

    #[test]
    fn test_locations_show_suggestions_for_missing() {
        let text = locations(&[Location {
            backend: BackendKind::Flatpak,
            available: Vec::new(),
            missing: vec!["firefx".to_string(), "vim".to_string()],
            failed: Vec::new(),
            resolved: BTreeMap::new(),
            suggestions: BTreeMap::from([(
                "firefx".to_string(),
                "org.mozilla.firefox".to_string(),
            )]),
        }]);

        assert!(text.contains("missing: firefx (did you mean org.mozilla.firefox?) vim"));
    }

    #[test]
    fn test_empty_environment() {
        let text = environment(&DetectedEnvironment::default());
        assert!(text.contains("no package manager found"));
    }
}
