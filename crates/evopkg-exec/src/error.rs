//! Error types for evopkg-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while dispatching a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// Executable could not be found
    #[error("executable not found: {0}")]
    NotFound(String),

    /// Command did not finish within its deadline
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Command ran but reported failure
    #[error("{program} exited with status {status}: {stderr}")]
    NonZeroExit {
        /// Program that failed
        program: String,
        /// Exit status code (-1 when killed by a signal)
        status: i32,
        /// Stderr output
        stderr: String,
    },

    /// Caller requested cancellation; the child was terminated
    #[error("command interrupted")]
    Interrupted,

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error during execution
    #[error("I/O error: {0}")]
    IoError(String),
}

impl ExecError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecError::Timeout { .. })
    }

    /// Whether the backend itself ran and failed, as opposed to evopkg
    /// being unable to run it
    #[must_use]
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            ExecError::NonZeroExit { .. } | ExecError::Timeout { .. }
        )
    }
}
