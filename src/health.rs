//! Health check support for the relay.
//!
//! Liveness, readiness and a full report derived from shutdown state,
//! packet counters and how long the pipeline has been on synthetic data.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::pipeline::StatsSnapshot;
use crate::shutdown::ShutdownState;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub ready: bool,
    pub accepting_cycles: bool,
    pub total_packets: u64,
    pub failed_packets: u64,
    pub failure_ratio: f64,
    pub consecutive_fallbacks: u32,
    pub uptime_secs: u64,
}

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Degraded once this many cycles in a row used synthetic data.
    pub max_consecutive_fallbacks: u32,
    /// Degraded above this failed share of packets.
    pub max_failure_ratio: f64,
    /// Ratio is ignored until this many packets have been seen.
    pub min_packets_for_ratio: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_consecutive_fallbacks: 5,
            max_failure_ratio: 0.5,
            min_packets_for_ratio: 10,
        }
    }
}

/// Aggregates health information from relay components.
pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    /// Check liveness: process is responsive.
    pub fn is_alive(&self) -> bool {
        true
    }

    /// Check readiness: the pipeline is still scheduling cycles.
    pub fn is_ready(&self, shutdown_state: ShutdownState) -> bool {
        shutdown_state == ShutdownState::Running
    }

    /// Generate full health report.
    pub fn report(
        &self,
        shutdown_state: ShutdownState,
        stats: &StatsSnapshot,
        consecutive_fallbacks: u32,
    ) -> HealthReport {
        let accepting = shutdown_state == ShutdownState::Running;

        HealthReport {
            state: self.compute_state(shutdown_state, stats, consecutive_fallbacks),
            ready: self.is_ready(shutdown_state),
            accepting_cycles: accepting,
            total_packets: stats.total_packets,
            failed_packets: stats.failed_packets,
            failure_ratio: stats.failure_ratio(),
            consecutive_fallbacks,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(
        &self,
        shutdown_state: ShutdownState,
        stats: &StatsSnapshot,
        consecutive_fallbacks: u32,
    ) -> HealthState {
        if shutdown_state != ShutdownState::Running {
            return HealthState::Unhealthy;
        }
        if consecutive_fallbacks >= self.config.max_consecutive_fallbacks {
            return HealthState::Degraded;
        }
        if stats.total_packets >= self.config.min_packets_for_ratio
            && stats.failure_ratio() > self.config.max_failure_ratio
        {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
