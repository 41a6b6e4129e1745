//! Spawning of one turn's Claude CLI process

use std::path::Path;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};

use crate::error::{ClaudeError, Result};
use crate::session::turn::TurnPlan;
use crate::types::options::SessionOptions;

use super::command::CommandBuilder;

/// A freshly spawned turn process with its three pipes detached
#[derive(Debug)]
pub struct TurnProcess {
    /// Child process handle
    pub child: Child,
    /// OS process ID (also the process group ID on Unix)
    pub pid: Option<u32>,
    /// Writable end of the child's stdin
    pub stdin: ChildStdin,
    /// Readable end of the child's stdout
    pub stdout: ChildStdout,
    /// Readable end of the child's stderr
    pub stderr: ChildStderr,
}

impl TurnProcess {
    /// Spawn the CLI for `plan`
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns `ClaudeError::Launch` if the process cannot be created or its
    /// stdio handles cannot be obtained
    pub fn spawn(cli_path: &Path, plan: &TurnPlan, options: &SessionOptions) -> Result<Self> {
        let mut cmd = CommandBuilder::new(plan, options).build(cli_path);

        let mut child = cmd.spawn().map_err(|e| {
            if let Some(ref cwd) = options.cwd
                && !cwd.exists()
            {
                return ClaudeError::launch(format!(
                    "Working directory does not exist: {}",
                    cwd.display()
                ));
            }
            ClaudeError::launch(format!("Failed to start {}: {e}", cli_path.display()))
        })?;

        let pid = child.id();

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClaudeError::launch("Failed to get stdin handle"))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClaudeError::launch("Failed to get stdout handle"))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClaudeError::launch("Failed to get stderr handle"))?;

        log::debug!(
            "Spawned {} for turn {} (pid {pid:?})",
            cli_path.display(),
            plan.turn
        );

        Ok(Self {
            child,
            pid,
            stdin,
            stdout,
            stderr,
        })
    }
}
