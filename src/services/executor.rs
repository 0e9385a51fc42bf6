//! External command execution
//!
//! Every OS-facing action of the controller is one bounded invocation of an
//! external tool. Nothing here supervises long-lived processes.

use log::debug;
#[cfg(feature = "mock")]
use mockall::automock;
use std::{fmt, io, process::Stdio, time::Duration};
use thiserror::Error;
use tokio::{process::Command, time::timeout};
use trait_variant::make;

/// A program and its arguments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl SystemCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for SystemCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Failure of a single command invocation
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn { command: String, source: io::Error },

    #[error("`{command}` exited with {status}: {detail}")]
    Exit {
        command: String,
        status: String,
        detail: String,
    },

    #[error("`{command}` timed out after {}s", .after.as_secs_f32())]
    TimedOut { command: String, after: Duration },
}

#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait CommandExecutor {
    /// Run `command` to completion and return its standard output
    async fn run(&self, command: &SystemCommand) -> Result<String, ExecError>;
}

/// Runs commands as child processes, killing them when the timeout elapses
#[derive(Clone, Debug)]
pub struct ProcessExecutor {
    timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandExecutor for ProcessExecutor {
    async fn run(&self, command: &SystemCommand) -> Result<String, ExecError> {
        debug!("run `{command}`");

        let mut child = Command::new(&command.program);
        child
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, child.output()).await {
            Ok(result) => result.map_err(|source| ExecError::Spawn {
                command: command.to_string(),
                source,
            })?,
            Err(_) => {
                return Err(ExecError::TimedOut {
                    command: command.to_string(),
                    after: self.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };

            return Err(ExecError::Exit {
                command: command.to_string(),
                status: output.status.to_string(),
                detail,
            });
        }

        Ok(stdout)
    }
}
