// src/process.rs

//! Subprocess execution
//!
//! Every external tool (`git`, `docker`, `gcloud`) is invoked through the
//! [`CommandRunner`] trait so the build engine can be exercised without the
//! tools installed.

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// How a subprocess's output is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Capture stdout/stderr for parsing
    Buffered,
    /// Stream stdout/stderr straight to the terminal
    Realtime,
}

/// A program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    /// Create an invocation of `program` with no arguments
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run in the given working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Space-joined command line, used for logging and error messages
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Captured result of a successful invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes subprocesses
///
/// Implementations must return `Err(Error::CommandFailed)` for non-zero exits.
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation, mode: OutputMode) -> Result<CommandOutput>;
}

/// Runs commands on the host with `std::process::Command`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation, mode: OutputMode) -> Result<CommandOutput> {
        debug!("Running: {}", invocation);

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        match mode {
            OutputMode::Buffered => {
                let output = cmd.stdin(Stdio::null()).output().map_err(|e| {
                    Error::ConfigError(format!(
                        "Failed to run {}: {}. Is it installed?",
                        invocation.program, e
                    ))
                })?;

                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();

                if !output.status.success() {
                    return Err(Error::CommandFailed {
                        command: invocation.command_line(),
                        status: output.status.to_string(),
                        stderr: stderr.trim().to_string(),
                    });
                }
                Ok(CommandOutput { stdout, stderr })
            }
            OutputMode::Realtime => {
                let status = cmd
                    .stdin(Stdio::null())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit())
                    .status()
                    .map_err(|e| {
                        Error::ConfigError(format!(
                            "Failed to run {}: {}. Is it installed?",
                            invocation.program, e
                        ))
                    })?;

                if !status.success() {
                    return Err(Error::CommandFailed {
                        command: invocation.command_line(),
                        status: status.to_string(),
                        stderr: String::new(),
                    });
                }
                Ok(CommandOutput::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_builder() {
        let inv = Invocation::new("git")
            .arg("-C")
            .arg("/tmp/repo")
            .args(["log", "-1"]);
        assert_eq!(inv.program, "git");
        assert_eq!(inv.args, vec!["-C", "/tmp/repo", "log", "-1"]);
        assert_eq!(inv.command_line(), "git -C /tmp/repo log -1");
        assert_eq!(inv.to_string(), inv.command_line());
    }

    #[test]
    fn test_system_runner_missing_program() {
        let inv = Invocation::new("cork-kube-definitely-not-a-program");
        let err = SystemRunner.run(&inv, OutputMode::Buffered).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
