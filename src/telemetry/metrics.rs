//! `metrics` facade recording. No-ops until a recorder is installed.

use ::metrics::{counter, histogram};

pub fn record_engine_call(action: &'static str, status: &'static str) {
    counter!("relay_engine_invocations_total", "action" => action, "status" => status).increment(1);
}

pub fn record_packet_success(latency_ms: Option<f64>) {
    counter!("relay_packets_total").increment(1);
    counter!("relay_packets_success_total").increment(1);
    if let Some(ms) = latency_ms {
        histogram!("relay_decrypt_latency_ms").record(ms);
    }
}

pub fn record_packet_failure(reason: &'static str) {
    counter!("relay_packets_total").increment(1);
    counter!("relay_packets_failed_total", "reason" => reason).increment(1);
}

pub fn record_fallback() {
    counter!("relay_fallback_total").increment(1);
}
