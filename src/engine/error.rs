//! Engine adapter error types.
//!
//! Validation errors are raised before any file or process is touched.
//! Everything else carries enough of the engine's own output to diagnose
//! the failure without re-running it.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by a cipher engine call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("Engine executable unavailable at {path}: {reason}")]
    Launch { path: PathBuf, reason: String },

    #[error("Engine {action} exited with code {exit_code}")]
    Engine {
        action: &'static str,
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Engine {action} timed out after {timeout_ms}ms")]
    TimedOut {
        action: &'static str,
        command: String,
        timeout_ms: u64,
    },

    #[error("Engine {action} produced no output at {path}")]
    EmptyOutput {
        action: &'static str,
        command: String,
        path: PathBuf,
        stdout: String,
        stderr: String,
    },

    #[error("Engine {action} wrote non-UTF-8 output at {path}")]
    InvalidOutput {
        action: &'static str,
        command: String,
        path: PathBuf,
        exit_code: i32,
        stderr: String,
    },

    #[error("Artifact I/O failed: {0}")]
    Artifact(String),
}

impl EngineError {
    /// Short stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Launch { .. } => "launch",
            Self::Engine { .. } => "engine",
            Self::TimedOut { .. } => "timeout",
            Self::EmptyOutput { .. } => "empty_output",
            Self::InvalidOutput { .. } => "invalid_output",
            Self::Artifact(_) => "artifact",
        }
    }

    /// Returns true if the request never reached the filesystem.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// The command line that was run, when one was.
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Engine { command, .. }
            | Self::TimedOut { command, .. }
            | Self::EmptyOutput { command, .. }
            | Self::InvalidOutput { command, .. } => Some(command),
            _ => None,
        }
    }
}
