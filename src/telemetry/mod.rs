//! Logging, tracing spans and metrics for the relay.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{record_engine_call, record_fallback, record_packet_failure, record_packet_success};
pub use spans::{CycleSpan, EngineSpan, SpanExt};
