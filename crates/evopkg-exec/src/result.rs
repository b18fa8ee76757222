//! Result types for command execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of a finished backend command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit status code (0 for success)
    pub status: i32,
    /// stdout output (empty for inherited streams)
    pub stdout: String,
    /// stderr output (empty for inherited streams)
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandResult {
    /// Successful result with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration: Duration::ZERO,
        }
    }

    /// Whether the backend exited with status 0
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }
}
