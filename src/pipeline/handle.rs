//! Control surface for a running pipeline.

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use super::state::PipelineSnapshot;
use crate::codec::{self, IV_LEN, KEY_LEN};
use crate::engine::{INVALID_IV_MESSAGE, INVALID_KEY_MESSAGE};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidKeyMaterial(String),

    #[error("Pipeline is no longer running")]
    Closed,
}

/// Applied by the pipeline at the next cycle boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineCommand {
    SetEncryption(bool),
    /// Already validated. Applying it also resets statistics.
    UpdateKeyMaterial { key: String, iv: String },
    ResetStatistics,
}

/// Cloneable handle for observers and controllers.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    commands: mpsc::UnboundedSender<PipelineCommand>,
    snapshots: watch::Receiver<PipelineSnapshot>,
}

impl PipelineHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<PipelineCommand>,
        snapshots: watch::Receiver<PipelineSnapshot>,
    ) -> Self {
        Self {
            commands,
            snapshots,
        }
    }

    /// Latest published state.
    pub fn snapshot(&self) -> PipelineSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that wakes on every published change.
    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.snapshots.clone()
    }

    pub fn set_encryption(&self, enabled: bool) -> Result<(), PipelineError> {
        self.send(PipelineCommand::SetEncryption(enabled))
    }

    /// Validate and queue new key material. Rejected input is never queued.
    pub fn update_key_material(&self, key: &str, iv: &str) -> Result<(), PipelineError> {
        if !codec::validate_length(key, Some(KEY_LEN)) {
            return Err(PipelineError::InvalidKeyMaterial(INVALID_KEY_MESSAGE.into()));
        }
        if !codec::validate_length(iv, Some(IV_LEN)) {
            return Err(PipelineError::InvalidKeyMaterial(INVALID_IV_MESSAGE.into()));
        }
        self.send(PipelineCommand::UpdateKeyMaterial {
            key: key.to_string(),
            iv: iv.to_string(),
        })
    }

    pub fn reset_statistics(&self) -> Result<(), PipelineError> {
        self.send(PipelineCommand::ResetStatistics)
    }

    fn send(&self, command: PipelineCommand) -> Result<(), PipelineError> {
        self.commands.send(command).map_err(|_| PipelineError::Closed)
    }
}
