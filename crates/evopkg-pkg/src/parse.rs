//! Backend output parsing
//!
//! Two jobs: decide whether a search listing contains the requested package,
//! and turn an info listing into [`PackageDetails`].

use serde::{Deserialize, Serialize};

use crate::error::PackageError;
use crate::types::{BackendKind, PackageDetails};

/// How a backend's search/info output is shaped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    /// `repo/name version` listings, `Key : value` info
    Pacman,
    /// `name/suite version arch` listings, RFC822-style info
    Apt,
    /// `name.arch : summary` listings, `Key : value` info
    Dnf,
    /// `|`-separated table listings, `Key : value` info
    Zypper,
    /// column listings, YAML-like info
    Snap,
    /// tab-separated listings keyed by reverse-DNS application IDs
    Flatpak,
}

/// Outcome of scanning a search listing for one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Existence {
    /// The listing has an entry for the package
    Found {
        /// Backend-side name when it differs from the request
        resolved_name: Option<String>,
        /// Details carried by the listing itself (Flatpak)
        listing: Option<PackageDetails>,
    },
    /// No entry matched
    Missing {
        /// Best-effort near match (Flatpak application IDs only)
        suggestion: Option<String>,
    },
}

impl Existence {
    /// Whether the package was found
    #[must_use]
    pub fn exists(&self) -> bool {
        matches!(self, Existence::Found { .. })
    }
}

const ARCH_SUFFIXES: &[&str] = &[
    "x86_64", "i686", "i386", "noarch", "aarch64", "armv7hl", "ppc64le", "s390x", "src",
];

/// Last segment of a reverse-DNS application ID, lowercased
///
/// `org.mozilla.firefox` becomes `firefox`; names without dots are only
/// lowercased.
#[must_use]
pub fn normalize_flatpak_id(id: &str) -> String {
    id.trim()
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Scan a search listing for an exact entry named `package`
#[must_use]
pub fn find_in_search(strategy: ParseStrategy, package: &str, stdout: &str) -> Existence {
    let wanted = package.trim().to_lowercase();

    if strategy == ParseStrategy::Flatpak {
        return find_flatpak(&wanted, stdout);
    }

    let found = stdout
        .lines()
        .filter_map(|line| listed_name(strategy, line))
        .any(|name| name.to_lowercase() == wanted);

    if found {
        Existence::Found {
            resolved_name: None,
            listing: None,
        }
    } else {
        Existence::Missing { suggestion: None }
    }
}

/// Package name a listing line refers to, if it is an entry line
fn listed_name(strategy: ParseStrategy, line: &str) -> Option<String> {
    // Indented lines are descriptions for every non-table format.
    if strategy != ParseStrategy::Zypper && line.starts_with(char::is_whitespace) {
        return (strategy == ParseStrategy::Dnf)
            .then(|| dnf_entry(line.trim()))
            .flatten();
    }

    match strategy {
        ParseStrategy::Pacman => {
            let first = line.split_whitespace().next()?;
            let (_, name) = first.split_once('/')?;
            Some(name.to_string())
        }
        ParseStrategy::Apt => {
            let first = line.split_whitespace().next()?;
            let (name, _) = first.split_once('/')?;
            Some(name.to_string())
        }
        ParseStrategy::Dnf => dnf_entry(line),
        ParseStrategy::Zypper => {
            let columns: Vec<&str> = line.split('|').map(str::trim).collect();
            let name = *columns.get(1)?;
            (!name.is_empty() && name != "Name").then(|| name.to_string())
        }
        ParseStrategy::Snap => {
            let name = line.split_whitespace().next()?;
            (name != "Name" && name != "No").then(|| name.to_string())
        }
        ParseStrategy::Flatpak => None,
    }
}

/// `vim-enhanced.x86_64 : summary` (dnf4) or `vim-enhanced.x86_64\tsummary` (dnf5)
fn dnf_entry(line: &str) -> Option<String> {
    if line.starts_with('=') || line.starts_with("Last metadata") || line.starts_with("Matched") {
        return None;
    }
    let first = line.split_whitespace().next()?;
    let (name, arch) = first.rsplit_once('.')?;
    ARCH_SUFFIXES.contains(&arch).then(|| name.to_string())
}

/// One parsed `flatpak search` row
struct FlatpakRow {
    name: String,
    description: Option<String>,
    app_id: String,
    version: Option<String>,
}

fn flatpak_rows(stdout: &str) -> Vec<FlatpakRow> {
    stdout
        .lines()
        .filter_map(|line| {
            let columns: Vec<&str> = line.split('\t').map(str::trim).collect();
            if columns.len() >= 3 {
                let app_id = columns[2];
                if app_id.is_empty() || app_id == "Application ID" {
                    return None;
                }
                return Some(FlatpakRow {
                    name: columns[0].to_string(),
                    description: non_empty(columns[1]),
                    app_id: app_id.to_string(),
                    version: columns.get(3).and_then(|v| non_empty(v)),
                });
            }

            // Space-aligned output: the ID is the first token shaped like
            // reverse DNS.
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let id_pos = tokens.iter().position(|t| t.matches('.').count() >= 2)?;
            Some(FlatpakRow {
                name: tokens[..id_pos.max(1)].first()?.to_string(),
                description: None,
                app_id: tokens[id_pos].to_string(),
                version: tokens.get(id_pos + 1).map(|v| (*v).to_string()),
            })
        })
        .collect()
}

fn find_flatpak(wanted: &str, stdout: &str) -> Existence {
    let rows = flatpak_rows(stdout);

    let exact = rows.iter().find(|row| {
        row.app_id.to_lowercase() == wanted
            || normalize_flatpak_id(&row.app_id) == wanted
            || row.name.to_lowercase() == wanted
    });

    if let Some(row) = exact {
        let resolved_name = (row.app_id.to_lowercase() != wanted).then(|| row.app_id.clone());
        let listing = PackageDetails {
            version: row.version.clone(),
            size: None,
            description: row.description.clone(),
            dependencies: Vec::new(),
        };
        return Existence::Found {
            resolved_name,
            listing: (!listing.is_empty()).then_some(listing),
        };
    }

    let suggestion = rows
        .iter()
        .find(|row| {
            row.app_id.to_lowercase().contains(wanted) || row.name.to_lowercase().contains(wanted)
        })
        .map(|row| row.app_id.clone());

    Existence::Missing { suggestion }
}

/// A `key: value` field with its indented continuation lines
#[derive(Debug)]
struct Field {
    key: String,
    value: String,
    continuation: Vec<String>,
}

fn fields(text: &str, right_aligned_keys: bool) -> Vec<Field> {
    let mut fields: Vec<Field> = Vec::new();

    for raw in text.lines() {
        if raw.trim().is_empty() {
            continue;
        }
        let line = if right_aligned_keys {
            raw.trim_start()
        } else {
            raw
        };

        let indented = line.starts_with(char::is_whitespace);
        let split = line
            .split_once(':')
            .filter(|(key, _)| !key.trim().is_empty());

        match split {
            Some((key, value)) if !indented => fields.push(Field {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
                continuation: Vec::new(),
            }),
            _ => {
                if let Some(last) = fields.last_mut() {
                    let text = match line.trim_start().strip_prefix(':') {
                        Some(rest) => rest.trim(),
                        None => line.trim(),
                    };
                    last.continuation.push(text.to_string());
                }
            }
        }
    }

    fields
}

fn lookup<'a>(fields: &'a [Field], keys: &[&str]) -> Option<&'a Field> {
    keys.iter().find_map(|wanted| {
        fields
            .iter()
            .find(|field| field.key.eq_ignore_ascii_case(wanted))
    })
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// First line of a field, falling back to its first continuation line
fn first_line(field: &Field) -> Option<String> {
    non_empty(&field.value)
        .filter(|v| v != "|")
        .or_else(|| field.continuation.first().and_then(|c| non_empty(c)))
}

/// Looks like `1.2MB`, `245.3 MB` (joined), `4096 kB`
fn size_token(text: &str) -> Option<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.iter().enumerate().find_map(|(i, token)| {
        let starts_numeric = token.starts_with(|c: char| c.is_ascii_digit());
        if starts_numeric && token.ends_with('B') {
            return Some((*token).to_string());
        }
        let unit = tokens.get(i + 1)?;
        let is_unit = unit.ends_with('B') && unit.len() <= 3;
        (starts_numeric && is_unit).then(|| format!("{token} {unit}"))
    })
}

/// Split a dependency value into names
fn dependency_list(strategy: ParseStrategy, field: &Field) -> Vec<String> {
    let mut text = field.value.clone();
    for line in &field.continuation {
        text.push(' ');
        text.push_str(line);
    }

    let text = text.trim();
    if text.is_empty() || text == "None" {
        return Vec::new();
    }

    match strategy {
        ParseStrategy::Apt => text
            .split(',')
            .filter_map(|dep| non_empty(dep.split('(').next().unwrap_or_default()))
            .collect(),
        _ => text
            .split_whitespace()
            .filter(|dep| !(dep.starts_with('[') && dep.ends_with(']')))
            .map(ToString::to_string)
            .collect(),
    }
}

/// Keys consulted for each attribute, in priority order
struct FieldKeys {
    version: &'static [&'static str],
    size: &'static [&'static str],
    description: &'static [&'static str],
    dependencies: &'static [&'static str],
}

fn field_keys(strategy: ParseStrategy) -> FieldKeys {
    match strategy {
        ParseStrategy::Pacman => FieldKeys {
            version: &["Version"],
            size: &["Installed Size", "Download Size"],
            description: &["Description"],
            dependencies: &["Depends On"],
        },
        ParseStrategy::Apt => FieldKeys {
            version: &["Version"],
            size: &["Installed-Size", "Download-Size", "Size"],
            description: &["Description"],
            dependencies: &["Depends"],
        },
        ParseStrategy::Dnf => FieldKeys {
            version: &["Version"],
            size: &["Installed size", "Size", "Package size"],
            description: &["Summary", "Description"],
            dependencies: &[],
        },
        ParseStrategy::Zypper => FieldKeys {
            version: &["Version"],
            size: &["Installed Size", "Size"],
            description: &["Summary", "Description"],
            dependencies: &["Requires"],
        },
        ParseStrategy::Snap => FieldKeys {
            version: &["installed"],
            size: &["installed"],
            description: &["summary", "description"],
            dependencies: &[],
        },
        ParseStrategy::Flatpak => FieldKeys {
            version: &["Version"],
            size: &["Installed", "Download"],
            description: &["Description"],
            dependencies: &["Runtime"],
        },
    }
}

/// Parse an info listing into package details
///
/// # Errors
/// Returns `ParseFailure` when neither a version nor a description can be
/// found.
pub fn parse_details(
    strategy: ParseStrategy,
    backend: BackendKind,
    stdout: &str,
) -> Result<PackageDetails, PackageError> {
    let parsed = fields(stdout, strategy == ParseStrategy::Flatpak);
    let keys = field_keys(strategy);

    let mut details = PackageDetails {
        version: lookup(&parsed, keys.version)
            .and_then(first_line)
            .and_then(|v| v.split_whitespace().next().map(ToString::to_string)),
        size: lookup(&parsed, keys.size).and_then(|f| match strategy {
            ParseStrategy::Snap => size_token(&f.value),
            _ => non_empty(&f.value),
        }),
        description: lookup(&parsed, keys.description).and_then(first_line),
        dependencies: lookup(&parsed, keys.dependencies)
            .map(|f| dependency_list(strategy, f))
            .unwrap_or_default(),
    };

    match strategy {
        // Snaps that are not installed only list channels.
        ParseStrategy::Snap if details.version.is_none() => {
            if let Some(channel) = lookup(&parsed, &["channels"])
                .and_then(|f| f.continuation.first())
                .and_then(|line| line.split_once(':').map(|(_, rest)| rest.to_string()))
            {
                details.version = channel.split_whitespace().next().map(ToString::to_string);
                details.size = details.size.or_else(|| size_token(&channel));
            }
        }
        // `Name - summary` header line above the fields
        ParseStrategy::Flatpak if details.description.is_none() => {
            details.description = stdout
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .and_then(|line| line.split_once(" - "))
                .and_then(|(_, summary)| non_empty(summary));
        }
        _ => {}
    }

    if details.version.is_none() && details.description.is_none() {
        return Err(PackageError::ParseFailure {
            backend,
            reason: "no version or description in output".to_string(),
        });
    }

    Ok(details)
}
