//! Core error types for evopkg-core

use evopkg_exec::ExecError;
use evopkg_pkg::PackageError;
use thiserror::Error;

/// Exit status: the operation succeeded
pub const EXIT_OK: i32 = 0;
/// Exit status: the backend ran and failed
pub const EXIT_BACKEND_FAILURE: i32 = 1;
/// Exit status: evopkg could not run the operation
pub const EXIT_EVOPKG_FAILURE: i32 = 2;
/// Exit status: the user interrupted the operation
pub const EXIT_INTERRUPTED: i32 = 130;

/// Errors that can occur in core operations
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Alias name belongs to a real backend
    #[error("'{0}' is reserved by a package manager")]
    ReservedName(String),

    /// Alias or executable with that name already exists
    #[error("alias already exists: {0}")]
    AliasAlreadyExists(String),

    /// Explicit lookup of an unknown alias
    #[error("alias not found: {0}")]
    AliasNotFound(String),

    /// Alias name is not usable as a command
    #[error("invalid alias name '{0}': use letters and digits only")]
    InvalidAliasName(String),

    /// Alias registry could not be read or written
    #[error("alias registry error: {0}")]
    Registry(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Package layer error
    #[error(transparent)]
    Package(#[from] PackageError),
}

impl From<ExecError> for CoreError {
    fn from(err: ExecError) -> Self {
        CoreError::Package(PackageError::Dispatch(err))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

impl CoreError {
    /// Whether the user interrupted the operation
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            CoreError::Package(PackageError::Dispatch(ExecError::Interrupted))
        )
    }

    /// Whether the backend ran and failed
    #[must_use]
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, CoreError::Package(e) if e.is_backend_failure())
    }

    /// Process exit status for this error
    ///
    /// Backend failures exit with 1, interruptions with 130, and everything
    /// evopkg itself could not do with 2.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_interrupted() {
            EXIT_INTERRUPTED
        } else if self.is_backend_failure() {
            EXIT_BACKEND_FAILURE
        } else {
            EXIT_EVOPKG_FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use evopkg_pkg::{BackendKind, Operation};

    use super::*;

    #[test]
    fn test_exit_codes_separate_backend_from_evopkg() {
        let backend = CoreError::from(ExecError::NonZeroExit {
            program: "pacman".to_string(),
            status: 1,
            stderr: "error: target not found: nope".to_string(),
        });
        assert_eq!(backend.exit_code(), EXIT_BACKEND_FAILURE);

        let timeout = CoreError::from(ExecError::Timeout {
            timeout: Duration::from_secs(10),
        });
        assert_eq!(timeout.exit_code(), EXIT_BACKEND_FAILURE);

        let conflict = CoreError::AliasAlreadyExists("mypkg".to_string());
        assert_eq!(conflict.exit_code(), EXIT_EVOPKG_FAILURE);

        let unsupported = CoreError::from(PackageError::UnsupportedOperation {
            backend: BackendKind::Snap,
            operation: Operation::ListFiles,
        });
        assert_eq!(unsupported.exit_code(), EXIT_EVOPKG_FAILURE);

        let missing_exe = CoreError::from(ExecError::NotFound("zypper".to_string()));
        assert_eq!(missing_exe.exit_code(), EXIT_EVOPKG_FAILURE);
    }

    #[test]
    fn test_interrupt_exit_code() {
        let err = CoreError::from(ExecError::Interrupted);
        assert!(err.is_interrupted());
        assert_eq!(err.exit_code(), EXIT_INTERRUPTED);
    }
}
