//! Error types for evopkg-pkg

use evopkg_exec::ExecError;
use thiserror::Error;

use crate::types::{BackendKind, Operation};

/// Errors that can occur during package operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackageError {
    /// Requested backend is not present on this host
    #[error("backend not detected: {0}")]
    BackendNotDetected(String),

    /// Backend has no template for the operation
    #[error("{backend} does not support {operation}")]
    UnsupportedOperation {
        /// Backend that lacks the template
        backend: BackendKind,
        /// Requested operation
        operation: Operation,
    },

    /// Verb is not part of the simulated grammar
    #[error("unknown {syntax} command: {verb}")]
    UnknownVerb {
        /// Grammar used to parse the verb
        syntax: BackendKind,
        /// Verb as typed
        verb: String,
    },

    /// Name does not match any backend
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// Operation needs package arguments
    #[error("{0} requires at least one package")]
    MissingPackages(Operation),

    /// Package not found in any probed repository
    #[error("package not found: {0}")]
    PackageNotFound(String),

    /// Backend output did not match the expected shape
    #[error("failed to parse {backend} output: {reason}")]
    ParseFailure {
        /// Backend whose output was parsed
        backend: BackendKind,
        /// What was wrong with it
        reason: String,
    },

    /// Dispatching the backend command failed
    #[error(transparent)]
    Dispatch(#[from] ExecError),
}

impl PackageError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, PackageError::Dispatch(e) if e.is_retryable())
    }

    /// Whether the backend ran and reported failure
    #[must_use]
    pub fn is_backend_failure(&self) -> bool {
        match self {
            PackageError::Dispatch(e) => e.is_backend_failure(),
            PackageError::PackageNotFound(_) => true,
            _ => false,
        }
    }
}
