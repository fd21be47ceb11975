//! Local process runner for the `az` and `gh` CLIs
//!
//! Every cloud and GitHub operation goes through here so stdout, stderr and the
//! exit status are captured the same way.

use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Failure of an external tool invocation
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("`{program}` is not installed or not on PATH")]
    NotFound { program: String },

    /// Non-zero exit; `stderr` is the tool's own message, kept verbatim.
    #[error("{stderr}")]
    Failed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected output from `{command}`: {reason}")]
    Parse { command: String, reason: String },

    #[error("HTTP error: {0}")]
    HTTP(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub command: String,
    pub execution_time: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Parse stdout as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, CommandError> {
        serde_json::from_str(self.stdout.trim()).map_err(|e| CommandError::Parse {
            command: self.command.clone(),
            reason: e.to_string(),
        })
    }

    fn into_checked(self) -> Result<Self, CommandError> {
        if self.success() {
            Ok(self)
        } else {
            let stderr = if self.stderr.trim().is_empty() {
                format!("`{}` exited with status {}", self.command, self.exit_code)
            } else {
                self.stderr.trim().to_string()
            };
            Err(CommandError::Failed {
                command: self.command,
                exit_code: self.exit_code,
                stderr,
            })
        }
    }
}

fn display_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a program to completion, capturing its output without checking the exit status
pub async fn capture(program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
    let command = display_command(program, args);
    let start_time = Instant::now();
    debug!("Running: {}", command);

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CommandError::NotFound {
                program: program.to_string(),
            },
            _ => CommandError::Spawn {
                command: command.clone(),
                source: e,
            },
        })?;

    let result = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
        command,
        execution_time: start_time.elapsed(),
    };
    debug!(
        "`{}` exited with {} after {:?}",
        result.command, result.exit_code, result.execution_time
    );
    Ok(result)
}

/// Run a program and fail on a non-zero exit status
pub async fn run(program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
    capture(program, args).await?.into_checked()
}

/// Run a program attached to the current terminal (used for `az login` and log tailing)
pub async fn run_attached(program: &str, args: &[&str]) -> Result<(), CommandError> {
    let command = display_command(program, args);
    debug!("Running attached: {}", command);

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CommandError::NotFound {
                program: program.to_string(),
            },
            _ => CommandError::Spawn {
                command: command.clone(),
                source: e,
            },
        })?;

    if status.success() {
        Ok(())
    } else {
        let exit_code = status.code().unwrap_or(-1);
        Err(CommandError::Failed {
            stderr: format!("`{}` exited with status {}", command, exit_code),
            command,
            exit_code,
        })
    }
}
