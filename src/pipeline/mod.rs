//! Telemetry acquisition pipeline.
//!
//! One cycle at a time: fetch ciphertext from the source (or synthesize a
//! sample when the source fails), decrypt it through the engine, parse the
//! sensor envelope, then update the logs and counters. The loop only ends
//! on shutdown; a failed cycle just schedules the next one.

mod handle;
mod ring;
mod state;
mod stats;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn, Instrument};

use crate::codec;
use crate::engine::{CipherEngine, CipherOutput, CipherRequest};
use crate::sensor::{SensorEnvelope, SyntheticGenerator};
use crate::shutdown::{PipelineRegistration, ShutdownCoordinator};
use crate::source::TelemetrySource;
use crate::telemetry::{
    record_fallback, record_packet_failure, record_packet_success, CycleSpan, SpanExt,
};
use crate::trace::parse_trace;

pub use handle::{PipelineCommand, PipelineError, PipelineHandle};
pub use ring::BoundedLog;
pub use state::{CyclePhase, PipelineSnapshot, RawEntry, SampleOrigin, TelemetrySample};
pub use stats::{StatisticsTracker, StatsSnapshot};

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Delay after a cycle that used the live source.
    pub poll_interval: Duration,
    /// Delay after a cycle that fell back to synthetic data.
    pub fallback_delay: Duration,
    pub encryption_enabled: bool,
    pub key: String,
    pub iv: String,
    pub log_capacity: usize,
    pub timing_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            fallback_delay: Duration::from_millis(1000),
            encryption_enabled: true,
            key: crate::config::DEFAULT_KEY.to_string(),
            iv: crate::config::DEFAULT_IV.to_string(),
            log_capacity: 20,
            timing_window: 100,
        }
    }
}

/// Outcome of one finished cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub origin: SampleOrigin,
    /// `Completed`, `DecryptFailed`, or `FetchFailed` when the fallback
    /// sample could not be produced.
    pub phase: CyclePhase,
    pub fell_back: bool,
    pub failure: Option<String>,
}

impl CycleReport {
    pub fn is_completed(&self) -> bool {
        self.phase == CyclePhase::Completed
    }
}

/// Ciphertext ready for the decrypt phase.
struct Inbound {
    origin: SampleOrigin,
    hex: String,
}

/// Failure of the decrypt-and-parse half of a cycle.
struct CycleFailure {
    phase: CyclePhase,
    reason: &'static str,
    message: String,
}

pub struct TelemetryPipeline {
    config: PipelineConfig,
    source: Arc<dyn TelemetrySource>,
    engine: Arc<dyn CipherEngine>,
    generator: SyntheticGenerator,
    stats: StatisticsTracker,
    raw_log: BoundedLog<RawEntry>,
    decrypted_log: BoundedLog<TelemetrySample>,
    latest_trace: Option<crate::trace::TraceModel>,
    consecutive_fallbacks: u32,
    cycle: u64,
    phase: CyclePhase,
    commands: mpsc::UnboundedReceiver<PipelineCommand>,
    snapshots: watch::Sender<PipelineSnapshot>,
}

impl TelemetryPipeline {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn TelemetrySource>,
        engine: Arc<dyn CipherEngine>,
    ) -> (Self, PipelineHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(PipelineSnapshot::empty(
            config.log_capacity,
            config.encryption_enabled,
        ));

        let pipeline = Self {
            stats: StatisticsTracker::new(config.timing_window),
            raw_log: BoundedLog::new(config.log_capacity),
            decrypted_log: BoundedLog::new(config.log_capacity),
            config,
            source,
            engine,
            generator: SyntheticGenerator::new(),
            latest_trace: None,
            consecutive_fallbacks: 0,
            cycle: 0,
            phase: CyclePhase::Idle,
            commands: command_rx,
            snapshots: snapshot_tx,
        };
        (pipeline, PipelineHandle::new(command_tx, snapshot_rx))
    }

    /// Replace the synthetic generator, e.g. with a seeded one.
    pub fn with_generator(mut self, generator: SyntheticGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            cycle: self.cycle,
            phase: self.phase,
            encryption_enabled: self.config.encryption_enabled,
            stats: self.stats.snapshot(),
            raw_log: self.raw_log.clone(),
            decrypted_log: self.decrypted_log.clone(),
            latest_trace: self.latest_trace.clone(),
            consecutive_fallbacks: self.consecutive_fallbacks,
        }
    }

    /// Poll until shutdown. Returns the number of cycles run.
    ///
    /// The pipeline registers with `shutdown` when this is called, not when
    /// the future is first polled, so a shutdown that begins before the task
    /// is scheduled still waits for the final snapshot.
    pub fn run(self, shutdown: ShutdownCoordinator) -> impl Future<Output = u64> + Send {
        let registration = shutdown.register_pipeline();
        self.run_registered(shutdown, registration)
    }

    async fn run_registered(
        mut self,
        shutdown: ShutdownCoordinator,
        registration: PipelineRegistration,
    ) -> u64 {
        let token = shutdown.token();
        info!(
            source = %self.source.describe(),
            encryption = self.config.encryption_enabled,
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "telemetry pipeline started"
        );

        loop {
            if token.is_cancelled() {
                break;
            }
            self.apply_commands();

            let Some(guard) = shutdown.begin_cycle() else {
                break;
            };
            let report = self.poll_once().await;
            drop(guard);

            let delay = if report.fell_back {
                self.config.fallback_delay
            } else {
                self.config.poll_interval
            };

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_phase(CyclePhase::Stopped);
        let stats = self.stats.snapshot();
        info!(
            cycles = self.cycle,
            total = stats.total_packets,
            success = stats.success_packets,
            failed = stats.failed_packets,
            "telemetry pipeline stopped"
        );
        drop(registration);
        self.cycle
    }

    /// Drain queued control commands.
    pub fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                PipelineCommand::SetEncryption(enabled) => {
                    info!(enabled, "encryption toggled");
                    self.config.encryption_enabled = enabled;
                }
                PipelineCommand::UpdateKeyMaterial { key, iv } => {
                    info!("key material updated; statistics reset");
                    self.config.key = key;
                    self.config.iv = iv;
                    self.stats.reset();
                }
                PipelineCommand::ResetStatistics => {
                    debug!("statistics reset");
                    self.stats.reset();
                }
            }
        }
        self.publish();
    }

    /// Run exactly one cycle.
    pub async fn poll_once(&mut self) -> CycleReport {
        self.cycle += 1;
        let span = CycleSpan::new(self.cycle);
        let report = self.cycle_inner().instrument(span.clone()).await;

        span.record("origin", report.origin.as_str());
        let outcome: Result<(), &str> = report.failure.as_deref().map_or(Ok(()), Err);
        span.record_result(&outcome);
        self.set_phase(CyclePhase::Idle);
        report
    }

    async fn cycle_inner(&mut self) -> CycleReport {
        self.set_phase(CyclePhase::Fetching);

        let mut fell_back = false;
        let inbound = match self.fetch_live().await {
            Ok(inbound) => {
                self.consecutive_fallbacks = 0;
                self.set_phase(CyclePhase::Decoded);
                Ok(inbound)
            }
            Err((reason, message)) => {
                self.set_phase(CyclePhase::FetchFailed);
                warn!(reason, error = %message, "telemetry fetch failed; using synthetic sample");
                self.fail_packet(reason);
                self.consecutive_fallbacks += 1;
                fell_back = true;
                record_fallback();
                self.synthesize().await
            }
        };

        let inbound = match inbound {
            Ok(inbound) => inbound,
            Err(message) => {
                return CycleReport {
                    cycle: self.cycle,
                    origin: SampleOrigin::Synthetic,
                    phase: CyclePhase::FetchFailed,
                    fell_back,
                    failure: Some(message),
                };
            }
        };

        let origin = inbound.origin;
        match self.complete(inbound).await {
            Ok(latency_ms) => {
                self.stats.record_success(latency_ms);
                record_packet_success(latency_ms);
                self.set_phase(CyclePhase::Completed);
                debug!(origin = origin.as_str(), latency_ms = ?latency_ms, "packet completed");
                CycleReport {
                    cycle: self.cycle,
                    origin,
                    phase: CyclePhase::Completed,
                    fell_back,
                    failure: None,
                }
            }
            Err(failure) => {
                warn!(reason = failure.reason, error = %failure.message, "packet failed");
                self.fail_packet(failure.reason);
                self.set_phase(failure.phase);
                CycleReport {
                    cycle: self.cycle,
                    origin,
                    phase: failure.phase,
                    fell_back,
                    failure: Some(failure.message),
                }
            }
        }
    }

    /// Fetch and normalize one live payload.
    async fn fetch_live(&mut self) -> Result<Inbound, (&'static str, String)> {
        let payload = self
            .source
            .fetch()
            .await
            .map_err(|e| (e.kind(), e.to_string()))?;
        let hex = codec::tokens_from_compact(&payload.encrypted_data)
            .map_err(|e| ("fetch_format", e.to_string()))?;
        Ok(Inbound {
            origin: SampleOrigin::Live,
            hex,
        })
    }

    /// Produce a synthetic packet in the same shape as a live one.
    ///
    /// With encryption on the sample goes through the engine first, so the
    /// decrypt half of the cycle runs unchanged.
    async fn synthesize(&mut self) -> Result<Inbound, String> {
        let json = self.generator.sample().to_json();

        if !self.config.encryption_enabled {
            return Ok(Inbound {
                origin: SampleOrigin::Synthetic,
                hex: codec::encode_hex(json.as_bytes()),
            });
        }

        let request = CipherRequest::encrypt(&self.config.key, &self.config.iv, json);
        let result = self.engine.execute(request).await;
        match result.outcome {
            Ok(CipherOutput::Ciphertext(hex)) => Ok(Inbound {
                origin: SampleOrigin::Synthetic,
                hex,
            }),
            Ok(other) => {
                self.fail_packet("encrypt");
                Err(format!("unexpected encrypt output: {:?}", other))
            }
            Err(e) => {
                self.fail_packet("encrypt");
                Err(format!("synthetic encrypt failed: {}", e))
            }
        }
    }

    /// Decrypt (when enabled), parse, and append. Returns decrypt latency.
    async fn complete(&mut self, inbound: Inbound) -> Result<Option<f64>, CycleFailure> {
        let (plaintext, latency_ms) = if self.config.encryption_enabled {
            self.set_phase(CyclePhase::Decrypting);
            let request = CipherRequest::decrypt(&self.config.key, &self.config.iv, &inbound.hex);
            let started = Instant::now();
            let result = self.engine.execute(request).await;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            if let Some(text) = &result.trace_text {
                self.latest_trace = Some(parse_trace(text));
            }
            match result.outcome {
                Ok(output) => (output.into_string(), Some(latency_ms)),
                Err(e) => {
                    return Err(CycleFailure {
                        phase: CyclePhase::DecryptFailed,
                        reason: "decrypt",
                        message: e.to_string(),
                    });
                }
            }
        } else {
            let bytes = codec::decode_hex(&inbound.hex).map_err(|e| CycleFailure {
                phase: CyclePhase::DecryptFailed,
                reason: "parse",
                message: e.to_string(),
            })?;
            let text = String::from_utf8(bytes).map_err(|e| CycleFailure {
                phase: CyclePhase::DecryptFailed,
                reason: "parse",
                message: e.to_string(),
            })?;
            (text, None)
        };

        let payload = SensorEnvelope::from_json(&plaintext).map_err(|e| CycleFailure {
            phase: CyclePhase::DecryptFailed,
            reason: "parse",
            message: e.to_string(),
        })?;

        let received_at = Utc::now();
        self.raw_log.push(RawEntry {
            received_at,
            origin: inbound.origin,
            ciphertext_hex: inbound.hex.clone(),
        });
        self.decrypted_log.push(TelemetrySample {
            received_at,
            origin: inbound.origin,
            ciphertext_hex: inbound.hex,
            plaintext,
            payload,
            decrypt_latency_ms: latency_ms,
        });
        Ok(latency_ms)
    }

    fn fail_packet(&mut self, reason: &'static str) {
        self.stats.record_failure();
        record_packet_failure(reason);
    }

    fn set_phase(&mut self, phase: CyclePhase) {
        self.phase = phase;
        self.publish();
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}
