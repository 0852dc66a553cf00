/// External tool execution
///
/// Every pg_dump / pg_restore call goes through a `CommandRunner` so the
/// drivers can be exercised without the PostgreSQL client tools installed.

use std::fmt;
use std::process::Command;

use crate::core::error::{BackupError, Result};

/// A fully assembled external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Value of the first `--file=` argument, if any
    pub fn output_file(&self) -> Option<&str> {
        self.args.iter().find_map(|a| a.strip_prefix("--file="))
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs external commands to completion
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Run the command, failing on a non-zero exit status
    fn run(&self, command: &ToolCommand) -> Result<()>;
}

/// Runs commands as child processes of this one.
///
/// The child inherits stdout/stderr and blocks the caller until it exits.
/// There is no timeout: a hung tool hangs the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &ToolCommand) -> Result<()> {
        tracing::info!(command = %command, "running");

        let status = Command::new(&command.program)
            .args(&command.args)
            .status()
            .map_err(|source| BackupError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(BackupError::ToolFailed {
                command: command.to_string(),
                code: status.code(),
            });
        }

        Ok(())
    }
}
