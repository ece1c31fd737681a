//! Process boundary for the external cipher engine.
//!
//! One OS process per call, no pool. A nonzero exit is data, not an error;
//! only a failure to start the process (or an expired timeout) is.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Exit code reported when no real exit status exists.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = -1;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to launch {path}: {reason}")]
    Launch { path: PathBuf, reason: String },

    #[error("Process {path} timed out after {timeout_ms}ms")]
    TimedOut { path: PathBuf, timeout_ms: u64 },
}

/// Captured result of one finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs an external command to completion.
#[async_trait]
pub trait ProcessInvoker: Send + Sync {
    /// Run `program` with `args`, capturing stdout and stderr fully.
    async fn run(&self, program: &Path, args: &[OsString]) -> Result<ProcessOutput, ProcessError>;
}

/// `tokio::process` backed invoker with an optional hard timeout.
#[derive(Debug, Clone, Default)]
pub struct TokioInvoker {
    timeout: Option<Duration>,
}

impl TokioInvoker {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[async_trait]
impl ProcessInvoker for TokioInvoker {
    async fn run(&self, program: &Path, args: &[OsString]) -> Result<ProcessOutput, ProcessError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout must take the child with it.
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| ProcessError::Launch {
            path: program.to_path_buf(),
            reason: e.to_string(),
        })?;

        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ProcessError::TimedOut {
                    path: program.to_path_buf(),
                    timeout_ms: limit.as_millis() as u64,
                })?,
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|e| ProcessError::Launch {
            path: program.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(ProcessOutput {
            // Signal-terminated children carry no code.
            exit_code: output.status.code().unwrap_or(LAUNCH_FAILURE_EXIT_CODE),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Render a command line for diagnostics.
pub fn display_command(program: &Path, args: &[OsString]) -> String {
    let mut line = format!("\"{}\"", program.display());
    for arg in args {
        line.push_str(" \"");
        line.push_str(&arg.to_string_lossy());
        line.push('"');
    }
    line
}
