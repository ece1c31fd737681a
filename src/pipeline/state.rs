//! Cycle phases and the records the pipeline keeps.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ring::BoundedLog;
use super::stats::StatsSnapshot;
use crate::sensor::{SensorEnvelope, SensorSummary};
use crate::trace::TraceModel;

/// Where a poll cycle currently is.
///
/// `Idle -> Fetching -> {Decoded | FetchFailed} -> Decrypting ->
/// {Completed | DecryptFailed} -> Idle`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    #[default]
    Idle,
    Fetching,
    Decoded,
    FetchFailed,
    Decrypting,
    Completed,
    DecryptFailed,
    /// The loop has exited.
    Stopped,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Decoded => "decoded",
            Self::FetchFailed => "fetch_failed",
            Self::Decrypting => "decrypting",
            Self::Completed => "completed",
            Self::DecryptFailed => "decrypt_failed",
            Self::Stopped => "stopped",
        }
    }
}

/// Whether a sample came from the live source or the local generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOrigin {
    Live,
    Synthetic,
}

impl SampleOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Synthetic => "synthetic",
        }
    }
}

/// Ciphertext as received, in token form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawEntry {
    pub received_at: DateTime<Utc>,
    pub origin: SampleOrigin,
    pub ciphertext_hex: String,
}

/// One decrypted, parsed sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub received_at: DateTime<Utc>,
    pub origin: SampleOrigin,
    pub ciphertext_hex: String,
    pub plaintext: String,
    pub payload: SensorEnvelope,
    /// `None` when encryption is disabled and no decrypt ran.
    pub decrypt_latency_ms: Option<f64>,
}

/// Read-only view published after every phase change.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub cycle: u64,
    pub phase: CyclePhase,
    pub encryption_enabled: bool,
    pub stats: StatsSnapshot,
    pub raw_log: BoundedLog<RawEntry>,
    pub decrypted_log: BoundedLog<TelemetrySample>,
    pub latest_trace: Option<TraceModel>,
    /// Cycles in a row that fell back to synthetic data.
    pub consecutive_fallbacks: u32,
}

impl PipelineSnapshot {
    pub fn empty(log_capacity: usize, encryption_enabled: bool) -> Self {
        Self {
            cycle: 0,
            phase: CyclePhase::Idle,
            encryption_enabled,
            stats: StatsSnapshot::default(),
            raw_log: BoundedLog::new(log_capacity),
            decrypted_log: BoundedLog::new(log_capacity),
            latest_trace: None,
            consecutive_fallbacks: 0,
        }
    }

    pub fn latest_sample(&self) -> Option<&TelemetrySample> {
        self.decrypted_log.latest()
    }

    /// Per-axis statistics over the decrypted log.
    pub fn summary(&self) -> SensorSummary {
        SensorSummary::from_samples(self.decrypted_log.iter().map(|s| &s.payload))
    }

    /// CSV export of the decrypted log.
    pub fn to_csv(&self) -> String {
        crate::sensor::to_csv(self.decrypted_log.iter().map(|s| (s.received_at, &s.payload)))
    }
}
