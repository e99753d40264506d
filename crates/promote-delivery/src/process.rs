//! Child process execution shared by the git and gh clients.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};

/// Captured result of one command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub command: String,
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into [`RemoteError::CommandFailed`].
    pub fn check(self) -> RemoteResult<CommandOutput> {
        if self.success() {
            return Ok(self);
        }
        Err(RemoteError::CommandFailed {
            command: self.command,
            status: format!("exit code {}", self.exit_code),
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Runs one binary inside a fixed working directory.
#[derive(Debug, Clone)]
pub struct Tool {
    binary: PathBuf,
    dir: PathBuf,
}

impl Tool {
    pub fn new(binary: impl Into<PathBuf>, dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run and capture, whatever the exit code.
    pub async fn capture(&self, args: &[&str]) -> RemoteResult<CommandOutput> {
        let command = format!("{} {}", self.binary.display(), args.join(" "));
        debug!(command = %command, dir = %self.dir.display(), "running command");

        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RemoteError::Spawn {
                command: command.clone(),
                source,
            })?;

        Ok(CommandOutput {
            command,
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Run and require a zero exit code.
    pub async fn run(&self, args: &[&str]) -> RemoteResult<CommandOutput> {
        self.capture(args).await?.check()
    }
}
