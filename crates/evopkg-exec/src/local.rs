//! Local command execution using `tokio::process`

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, error, instrument, warn};

use crate::command::{Command, OutputMode};
use crate::error::ExecError;
use crate::interrupt::Interrupt;
use crate::result::CommandResult;
use crate::traits::Dispatcher;

/// Default deadline for a single command
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Local command dispatcher
///
/// Executes commands on the local machine using `tokio::process::Command`.
/// Children are spawned with `kill_on_drop`, so a timed out or interrupted
/// command never outlives its dispatch.
#[derive(Debug, Clone)]
pub struct LocalDispatcher {
    /// Program prepended to elevated commands (e.g. `sudo`)
    elevation: Option<String>,
    /// Deadline used by [`Dispatcher::run`]
    default_timeout: Duration,
    /// Shared cancellation flag
    interrupt: Interrupt,
}

impl LocalDispatcher {
    /// Create a new local dispatcher using `sudo` for elevation
    #[must_use]
    pub fn new() -> Self {
        Self {
            elevation: Some("sudo".to_string()),
            default_timeout: DEFAULT_TIMEOUT,
            interrupt: Interrupt::new(),
        }
    }

    /// Set the elevation program (`None` or empty disables elevation)
    #[must_use]
    pub fn with_elevation(mut self, elevation: Option<String>) -> Self {
        self.elevation = elevation.filter(|e| !e.is_empty());
        self
    }

    /// Set the default deadline
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Share an interrupt flag with this dispatcher
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Internal method to execute command
    #[instrument(skip(self), fields(command = %cmd), level = "debug")]
    async fn execute(&self, cmd: &Command, limit: Duration) -> Result<CommandResult, ExecError> {
        if self.interrupt.is_triggered() {
            return Err(ExecError::Interrupted);
        }

        let start = Instant::now();
        let argv = cmd.argv(self.elevation.as_deref());
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ExecError::SpawnError("empty command".to_string()))?;

        debug!(argv = ?argv, "executing local command");

        let mut process = tokio::process::Command::new(program);
        process
            .args(args)
            .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);

        match cmd.output {
            OutputMode::Capture => {
                process
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped());
            }
            OutputMode::Inherit => {
                process
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
        }

        let child = process.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExecError::NotFound(program.clone())
            } else {
                ExecError::SpawnError(e.to_string())
            }
        })?;

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            waited = timeout(limit, child.wait_with_output()) => match waited {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return Err(ExecError::IoError(e.to_string())),
                Err(_) => {
                    error!(
                        timeout = ?limit,
                        elapsed = ?start.elapsed(),
                        "command timed out"
                    );
                    return Err(ExecError::Timeout { timeout: limit });
                }
            },
            () = self.interrupt.triggered() => {
                warn!(elapsed = ?start.elapsed(), "command interrupted, child terminated");
                return Err(ExecError::Interrupted);
            }
        };

        let duration = start.elapsed();
        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        debug!(status = status, duration = ?duration, "command completed");

        if !output.status.success() {
            debug!(status = status, stderr = %stderr, "command failed");
            return Err(ExecError::NonZeroExit {
                program: cmd.program.clone(),
                status,
                stderr,
            });
        }

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }
}

impl Default for LocalDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn run(&self, cmd: &Command) -> Result<CommandResult, ExecError> {
        self.execute(cmd, self.default_timeout).await
    }

    async fn run_with_timeout(
        &self,
        cmd: &Command,
        timeout_duration: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.execute(cmd, timeout_duration).await
    }

    fn dispatcher_type(&self) -> &'static str {
        "local"
    }
}
