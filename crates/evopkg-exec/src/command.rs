//! Command description handed to a dispatcher

use std::fmt;

use serde::{Deserialize, Serialize};

/// How the child's standard streams are wired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Capture stdout/stderr into the [`crate::CommandResult`]
    #[default]
    Capture,
    /// Child shares the terminal (interactive installs, prompts)
    Inherit,
}

/// A fully resolved external command
///
/// Arguments are kept as a discrete vector and are never joined into a
/// shell string, so package names cannot inject shell syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Executable name or path
    pub program: String,
    /// Argument vector (without the program)
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Whether the dispatcher must prepend privilege escalation
    pub elevate: bool,
    /// Stream handling
    pub output: OutputMode,
}

impl Command {
    /// Create a command with captured output and no elevation
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: vec![("TERM".to_string(), "xterm-256color".to_string())],
            elevate: false,
            output: OutputMode::Capture,
        }
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.env.retain(|(k, _)| *k != key);
        self.env.push((key, value.into()));
        self
    }

    /// Mark the command as needing elevation
    #[must_use]
    pub fn elevated(mut self, elevate: bool) -> Self {
        self.elevate = elevate;
        self
    }

    /// Set stream handling
    #[must_use]
    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// The argv the dispatcher will execute, elevation included
    #[must_use]
    pub fn argv(&self, elevation: Option<&str>) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        if self.elevate
            && let Some(elevation) = elevation.filter(|e| !e.is_empty())
        {
            argv.push(elevation.to_string());
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argv_without_elevation() {
        let cmd = Command::new("pacman").arg("-S").arg("vim");
        assert_eq!(cmd.argv(Some("sudo")), vec!["pacman", "-S", "vim"]);
    }

    #[test]
    fn test_argv_with_elevation() {
        let cmd = Command::new("apt").args(["install", "curl"]).elevated(true);
        assert_eq!(cmd.argv(Some("sudo")), vec!["sudo", "apt", "install", "curl"]);
        assert_eq!(cmd.argv(Some("")), vec!["apt", "install", "curl"]);
        assert_eq!(cmd.argv(None), vec!["apt", "install", "curl"]);
    }

    #[test]
    fn test_package_names_stay_discrete() {
        let cmd = Command::new("dnf").arg("info").arg("vim; rm -rf /");
        assert_eq!(cmd.args.len(), 2);
        assert_eq!(cmd.args[1], "vim; rm -rf /");
    }

    #[test]
    fn test_env_overrides() {
        let cmd = Command::new("snap").env("TERM", "dumb");
        assert_eq!(cmd.env, vec![("TERM".to_string(), "dumb".to_string())]);
    }
}
