//! Comparison aggregation
//!
//! Joins query results into a rectangular table: one row per requested
//! package in request order, one cell per requested backend in fixed
//! backend order.

use crate::types::{BackendKind, CellStatus, ComparisonCell, ComparisonRow, QueryResult};

/// Merge per-backend results into ordered comparison rows
///
/// A backend with no result for a package gets a `NotFound` cell, and a
/// package no backend carries still gets a row. Duplicate package names keep
/// their first position.
#[must_use]
pub fn compare<S: AsRef<str>>(
    packages: &[S],
    backends: &[BackendKind],
    results: &[QueryResult],
) -> Vec<ComparisonRow> {
    let mut columns = backends.to_vec();
    columns.sort();
    columns.dedup();

    let mut rows: Vec<ComparisonRow> = Vec::new();
    for package in packages {
        let package = package.as_ref().trim();
        if package.is_empty() || rows.iter().any(|row| row.package == package) {
            continue;
        }

        let cells = columns
            .iter()
            .map(|backend| ComparisonCell {
                backend: *backend,
                status: results
                    .iter()
                    .find(|r| r.backend == *backend && r.package == package)
                    .map_or(CellStatus::NotFound { suggestion: None }, cell_status),
            })
            .collect();

        rows.push(ComparisonRow {
            package: package.to_string(),
            cells,
        });
    }
    rows
}

fn cell_status(result: &QueryResult) -> CellStatus {
    match (&result.failure, result.found) {
        (Some(failure), _) => CellStatus::Failed {
            failure: failure.clone(),
        },
        (None, true) => CellStatus::Found {
            resolved_name: result.resolved_name.clone(),
            details: result.details(),
        },
        (None, false) => CellStatus::NotFound {
            suggestion: result.suggestion.clone(),
        },
    }
}
