//! Span helpers for engine calls and poll cycles.

use tracing::{info_span, Span};

/// Extension trait for recording outcomes onto a span.
pub trait SpanExt {
    /// Record `status` and, on error, `error.message`.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Span factory for one engine invocation.
pub struct EngineSpan;

impl EngineSpan {
    /// Fields `status`, `error.message`, `request_id`, `exit_code` and
    /// `latency_ms` are filled in as the call progresses.
    pub fn new(action: &str) -> Span {
        info_span!(
            "engine_call",
            action = %action,
            request_id = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            exit_code = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}

/// Span factory for one pipeline poll cycle.
pub struct CycleSpan;

impl CycleSpan {
    pub fn new(cycle: u64) -> Span {
        info_span!(
            "poll_cycle",
            cycle = cycle,
            origin = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
