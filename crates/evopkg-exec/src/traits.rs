//! Dispatcher trait

use std::time::Duration;

use async_trait::async_trait;

use crate::command::Command;
use crate::error::ExecError;
use crate::result::CommandResult;

/// Runs external commands
///
/// Implementations return `Err(ExecError::NonZeroExit)` when the program ran
/// and failed, so callers never have to re-check the status of an `Ok`.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Run a command with the dispatcher's default deadline
    async fn run(&self, cmd: &Command) -> Result<CommandResult, ExecError>;

    /// Run a command with an explicit deadline
    async fn run_with_timeout(
        &self,
        cmd: &Command,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Short label for logs
    fn dispatcher_type(&self) -> &'static str;
}
