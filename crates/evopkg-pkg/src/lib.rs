//! evopkg-pkg: Backend abstraction
//!
//! Knows every supported package manager: how to find it on the host, how to
//! spell each operation for it, how to read its output, and how to ask
//! several of them the same question at once.

pub mod cache;
pub mod compare;
pub mod descriptor;
pub mod detect;
pub mod error;
pub mod parse;
pub mod query;
pub mod translate;
pub mod types;

pub use cache::{CacheEntry, ExistenceCache};
pub use compare::compare;
pub use descriptor::{Backend, BackendTable, NoMatch, StderrRule, Template};
pub use detect::{DetectedBackend, DetectedEnvironment, Detector, HostProbe, OsRelease, SystemProbe};
pub use error::PackageError;
pub use parse::{Existence, ParseStrategy};
pub use query::{QueryEngine, QueryOptions};
pub use translate::{Translator, parse_verb, syntax_for_program, verb_for};
pub use types::{
    BackendKind, CellStatus, ComparisonCell, ComparisonRow, DistroFamily, Operation,
    PackageDetails, QueryFailure, QueryResult,
};
