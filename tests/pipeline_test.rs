//! Pipeline cycle tests with an in-memory source and a hex "cipher".

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use rabbit_relay::codec;
use rabbit_relay::engine::{
    CipherAction, CipherEngine, CipherOutput, CipherRequest, CipherResult, EngineError, Payload,
};
use rabbit_relay::pipeline::{
    CyclePhase, PipelineConfig, PipelineError, SampleOrigin, TelemetryPipeline,
};
use rabbit_relay::sensor::SyntheticGenerator;
use rabbit_relay::shutdown::{ShutdownCoordinator, ShutdownResult};
use rabbit_relay::source::{FetchError, SourcePayload, TelemetrySource};

const READING: &str =
    r#"{"accel":{"x":0.1,"y":0.2,"z":0.98},"gyro":{"x":1.0,"y":2.0,"z":3.0},"temp":23.5}"#;

/// Replays queued responses, then reports the source as offline.
#[derive(Default)]
struct ScriptedSource {
    responses: Mutex<VecDeque<Result<SourcePayload, FetchError>>>,
}

impl ScriptedSource {
    fn push_live(&self, plaintext: &str) {
        self.responses.lock().push_back(Ok(SourcePayload {
            encrypted_data: hex::encode(plaintext),
        }));
    }

    fn push(&self, response: Result<SourcePayload, FetchError>) {
        self.responses.lock().push_back(response);
    }
}

#[async_trait]
impl TelemetrySource for ScriptedSource {
    async fn fetch(&self) -> Result<SourcePayload, FetchError> {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Transport("offline".into())))
    }

    fn describe(&self) -> String {
        "scripted".into()
    }
}

/// Ciphertext is the plaintext's hex; decrypt reverses it.
#[derive(Default)]
struct HexEngine {
    fail_encrypt: AtomicBool,
    fail_decrypt: AtomicBool,
    stall_decrypt: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl CipherEngine for HexEngine {
    async fn execute(&self, request: CipherRequest) -> CipherResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.action == CipherAction::Decrypt && self.stall_decrypt.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let failed = |action: CipherAction| EngineError::Engine {
            action: action.as_str(),
            command: "hex-engine".into(),
            exit_code: 1,
            stdout: String::new(),
            stderr: "forced failure".into(),
        };

        let (outcome, trace_text) = match (request.action, request.payload) {
            (CipherAction::Encrypt, _) if self.fail_encrypt.load(Ordering::SeqCst) => {
                (Err(failed(request.action)), None)
            }
            (CipherAction::Encrypt, Payload::Text(text)) => (
                Ok(CipherOutput::Ciphertext(codec::encode_hex(text.as_bytes()))),
                None,
            ),
            (CipherAction::Decrypt, _) if self.fail_decrypt.load(Ordering::SeqCst) => {
                (Err(failed(request.action)), None)
            }
            (CipherAction::Decrypt, Payload::Hex(hex)) => {
                let bytes = codec::decode_hex(&hex).unwrap();
                (
                    Ok(CipherOutput::Plaintext(String::from_utf8_lossy(&bytes).into_owned())),
                    Some("Step 1: Key Setup\nx[0] = 0x1A2B\n".to_string()),
                )
            }
            (action, _) => (Err(EngineError::Validation(format!("{:?}", action))), None),
        };

        CipherResult {
            action: request.action,
            request_id: Some("test".into()),
            outcome,
            trace_text,
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        poll_interval: Duration::from_millis(10),
        fallback_delay: Duration::from_millis(10),
        ..Default::default()
    }
}

fn pipeline_with(
    config: PipelineConfig,
) -> (
    TelemetryPipeline,
    rabbit_relay::pipeline::PipelineHandle,
    Arc<ScriptedSource>,
    Arc<HexEngine>,
) {
    let source = Arc::new(ScriptedSource::default());
    let engine = Arc::new(HexEngine::default());
    let (pipeline, handle) = TelemetryPipeline::new(config, source.clone(), engine.clone());
    (
        pipeline.with_generator(SyntheticGenerator::seeded(7)),
        handle,
        source,
        engine,
    )
}

#[tokio::test]
async fn test_live_packet_completes() {
    let (mut pipeline, _handle, source, _engine) = pipeline_with(config());
    source.push_live(READING);

    let report = pipeline.poll_once().await;
    assert!(report.is_completed());
    assert_eq!(report.origin, SampleOrigin::Live);
    assert!(!report.fell_back);

    let snap = pipeline.snapshot();
    assert_eq!(snap.stats.total_packets, 1);
    assert_eq!(snap.stats.success_packets, 1);
    assert_eq!(snap.stats.timing_samples, 1);
    assert_eq!(snap.raw_log.len(), 1);
    let sample = snap.latest_sample().unwrap();
    assert_eq!(sample.origin, SampleOrigin::Live);
    assert_eq!(sample.payload.temp, 23.5);
    assert!(sample.decrypt_latency_ms.is_some());
    assert_eq!(snap.latest_trace.unwrap().steps.len(), 1);
    assert_eq!(snap.phase, CyclePhase::Idle);
}

#[tokio::test]
async fn test_transport_failure_falls_back_to_synthetic() {
    let (mut pipeline, _handle, source, _engine) = pipeline_with(config());

    let report = pipeline.poll_once().await;
    assert!(report.fell_back);
    assert!(report.is_completed());
    assert_eq!(report.origin, SampleOrigin::Synthetic);

    let snap = pipeline.snapshot();
    assert_eq!(snap.stats.total_packets, 2);
    assert_eq!(snap.stats.failed_packets, 1);
    assert_eq!(snap.stats.success_packets, 1);
    assert_eq!(snap.consecutive_fallbacks, 1);
    let sample = snap.latest_sample().unwrap();
    assert_eq!(sample.origin, SampleOrigin::Synthetic);
    assert!((-2.0..2.0).contains(&sample.payload.accel.x));

    source.push_live(READING);
    pipeline.poll_once().await;
    assert_eq!(pipeline.snapshot().consecutive_fallbacks, 0);
}

#[tokio::test]
async fn test_malformed_hex_falls_back() {
    let (mut pipeline, _handle, source, _engine) = pipeline_with(config());
    source.push(Ok(SourcePayload {
        encrypted_data: "zz1".into(),
    }));

    let report = pipeline.poll_once().await;
    assert!(report.fell_back);
    assert!(report.is_completed());
    assert_eq!(pipeline.snapshot().stats.failed_packets, 1);
}

#[tokio::test]
async fn test_logs_are_bounded() {
    let (mut pipeline, _handle, source, _engine) = pipeline_with(config());
    for _ in 0..21 {
        source.push_live(READING);
        assert!(pipeline.poll_once().await.is_completed());
    }

    let snap = pipeline.snapshot();
    assert_eq!(snap.raw_log.len(), 20);
    assert_eq!(snap.decrypted_log.len(), 20);
    assert_eq!(snap.stats.total_packets, 21);
    assert_eq!(snap.stats.success_packets, 21);
}

#[tokio::test]
async fn test_counters_always_balance() {
    let (mut pipeline, _handle, source, engine) = pipeline_with(config());
    source.push_live(READING);
    source.push(Err(FetchError::Format("bad".into())));
    source.push_live("not json");
    source.push_live(READING);

    for i in 0..6 {
        if i == 4 {
            engine.fail_decrypt.store(true, Ordering::SeqCst);
        }
        pipeline.poll_once().await;
        let stats = pipeline.snapshot().stats;
        assert_eq!(
            stats.total_packets,
            stats.success_packets + stats.failed_packets
        );
    }
}

#[tokio::test]
async fn test_decrypt_failure_records_failed_packet() {
    let (mut pipeline, _handle, source, engine) = pipeline_with(config());
    engine.fail_decrypt.store(true, Ordering::SeqCst);
    source.push_live(READING);

    let report = pipeline.poll_once().await;
    assert_eq!(report.phase, CyclePhase::DecryptFailed);
    assert!(report.failure.is_some());

    let snap = pipeline.snapshot();
    assert_eq!(snap.stats.failed_packets, 1);
    assert_eq!(snap.stats.success_packets, 0);
    assert!(snap.raw_log.is_empty());
}

#[tokio::test]
async fn test_unparseable_plaintext_is_failure() {
    let (mut pipeline, _handle, source, _engine) = pipeline_with(config());
    source.push_live("definitely not json");

    let report = pipeline.poll_once().await;
    assert_eq!(report.phase, CyclePhase::DecryptFailed);
    assert_eq!(pipeline.snapshot().stats.failed_packets, 1);
}

#[tokio::test]
async fn test_synthetic_encrypt_failure_counts_twice() {
    let (mut pipeline, _handle, _source, engine) = pipeline_with(config());
    engine.fail_encrypt.store(true, Ordering::SeqCst);

    let report = pipeline.poll_once().await;
    assert_eq!(report.phase, CyclePhase::FetchFailed);
    assert!(report.fell_back);

    let stats = pipeline.snapshot().stats;
    assert_eq!(stats.total_packets, 2);
    assert_eq!(stats.failed_packets, 2);
}

#[tokio::test]
async fn test_encryption_off_skips_engine() {
    let (mut pipeline, handle, source, engine) = pipeline_with(config());
    handle.set_encryption(false).unwrap();
    pipeline.apply_commands();
    assert!(!pipeline.snapshot().encryption_enabled);

    source.push_live(READING);
    assert!(pipeline.poll_once().await.is_completed());
    // Synthetic samples bypass the engine too.
    assert!(pipeline.poll_once().await.is_completed());

    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    let snap = pipeline.snapshot();
    assert_eq!(snap.stats.timing_samples, 0);
    assert!(snap.latest_sample().unwrap().decrypt_latency_ms.is_none());
}

#[tokio::test]
async fn test_encryption_off_rejects_non_utf8_packet() {
    let (mut pipeline, handle, source, _engine) = pipeline_with(config());
    handle.set_encryption(false).unwrap();
    pipeline.apply_commands();

    source.push(Ok(SourcePayload {
        encrypted_data: hex::encode([0xFF, 0xFE, b'{', b'}']),
    }));
    let report = pipeline.poll_once().await;
    assert_eq!(report.phase, CyclePhase::DecryptFailed);

    let snap = pipeline.snapshot();
    assert_eq!(snap.stats.failed_packets, 1);
    assert!(snap.latest_sample().is_none());
}

#[tokio::test]
async fn test_key_update_validates_and_resets_stats() {
    let (mut pipeline, handle, source, _engine) = pipeline_with(config());
    source.push_live(READING);
    pipeline.poll_once().await;

    assert!(matches!(
        handle.update_key_material("00 11", "01 23 45 67 89 AB CD EF"),
        Err(PipelineError::InvalidKeyMaterial(_))
    ));
    pipeline.apply_commands();
    assert_eq!(pipeline.snapshot().stats.total_packets, 1);

    handle
        .update_key_material(
            "FF EE DD CC BB AA 99 88 77 66 55 44 33 22 11 00",
            "01 23 45 67 89 AB CD EF",
        )
        .unwrap();
    pipeline.apply_commands();
    assert_eq!(pipeline.snapshot().stats.total_packets, 0);
    assert_eq!(
        pipeline.config().key,
        "FF EE DD CC BB AA 99 88 77 66 55 44 33 22 11 00"
    );
}

#[tokio::test]
async fn test_handle_sees_published_snapshots() {
    let (mut pipeline, handle, source, _engine) = pipeline_with(config());
    source.push_live(READING);
    pipeline.poll_once().await;

    let snap = handle.snapshot();
    assert_eq!(snap.cycle, 1);
    assert_eq!(snap.stats.success_packets, 1);

    handle.reset_statistics().unwrap();
    pipeline.apply_commands();
    assert_eq!(handle.snapshot().stats.total_packets, 0);
}

#[tokio::test]
async fn test_handle_reports_closed_pipeline() {
    let (pipeline, handle, _source, _engine) = pipeline_with(config());
    drop(pipeline);
    assert!(matches!(handle.set_encryption(false), Err(PipelineError::Closed)));
}

#[tokio::test]
async fn test_snapshot_summary_and_csv() {
    let (mut pipeline, _handle, source, _engine) = pipeline_with(config());
    source.push_live(READING);
    source.push_live(
        r#"{"accel":{"x":0.3,"y":0.2,"z":0.98},"gyro":{"x":-1.0,"y":2.0,"z":3.0},"temp":24.5}"#,
    );
    pipeline.poll_once().await;
    pipeline.poll_once().await;

    let snap = pipeline.snapshot();
    let summary = snap.summary();
    assert_eq!(summary.samples, 2);
    assert!((summary.accel[0].avg - 0.2).abs() < 1e-9);
    assert_eq!(summary.accel[0].max, 0.3);
    assert_eq!(summary.gyro[0].min, -1.0);
    assert_eq!(summary.temp.avg, 24.0);

    let csv = snap.to_csv();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], rabbit_relay::sensor::CSV_HEADER);
    assert!(lines[1].ends_with(",0.1,0.2,0.98,1,2,3,23.5"), "{}", lines[1]);
}

#[tokio::test]
async fn test_run_keeps_polling_until_shutdown() {
    let (pipeline, handle, _source, _engine) = pipeline_with(config());
    let shutdown = ShutdownCoordinator::new();
    let task = tokio::spawn(pipeline.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(shutdown.pipelines_running(), 1);
    let result = shutdown.initiate(Duration::from_secs(2)).await;
    assert_eq!(result, ShutdownResult::Complete);
    // Drain only completes once the final snapshot is out.
    assert_eq!(handle.snapshot().phase, CyclePhase::Stopped);
    let cycles = task.await.unwrap();

    // Source is offline the whole time; every cycle falls back.
    assert!(cycles >= 2, "only {} cycles", cycles);
    let snap = handle.snapshot();
    assert_eq!(snap.phase, CyclePhase::Stopped);
    assert_eq!(snap.consecutive_fallbacks as u64, cycles);
    assert_eq!(snap.stats.success_packets, cycles);
}

#[tokio::test]
async fn test_stuck_engine_call_is_aborted_at_shutdown_deadline() {
    let (pipeline, _handle, source, engine) = pipeline_with(config());
    engine.stall_decrypt.store(true, Ordering::SeqCst);
    source.push_live(READING);

    let shutdown = ShutdownCoordinator::new();
    let task = tokio::spawn(pipeline.run(shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(shutdown.cycles_in_flight(), 1);

    let started = std::time::Instant::now();
    let (result, cycles) = shutdown.stop_task(task, Duration::from_millis(100)).await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(
        result,
        ShutdownResult::Timeout {
            cycles_in_flight: 1,
            pipelines_running: 1,
        }
    );
    assert_eq!(cycles, None);
    assert_eq!(shutdown.pipelines_running(), 0);
}
