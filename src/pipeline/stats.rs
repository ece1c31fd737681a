//! Packet counters and decrypt timing.

use serde::Serialize;

use super::ring::BoundedLog;

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_packets: u64,
    pub success_packets: u64,
    pub failed_packets: u64,
    /// Mean over the bounded timing window, in milliseconds.
    pub avg_decrypt_ms: f64,
    /// Mean over every timed packet since the last reset.
    pub lifetime_avg_decrypt_ms: f64,
    pub timing_samples: usize,
}

impl StatsSnapshot {
    /// Failed share of all packets, 0.0 when nothing has arrived.
    pub fn failure_ratio(&self) -> f64 {
        if self.total_packets == 0 {
            0.0
        } else {
            self.failed_packets as f64 / self.total_packets as f64
        }
    }
}

/// Running counters. Owned by the pipeline; everyone else sees snapshots.
///
/// `total == success + failed` holds after every call.
#[derive(Debug, Clone)]
pub struct StatisticsTracker {
    total: u64,
    success: u64,
    failed: u64,
    timings: BoundedLog<f64>,
    timing_sum: f64,
    timing_count: u64,
}

impl StatisticsTracker {
    pub fn new(timing_window: usize) -> Self {
        Self {
            total: 0,
            success: 0,
            failed: 0,
            timings: BoundedLog::new(timing_window),
            timing_sum: 0.0,
            timing_count: 0,
        }
    }

    /// A packet that completed. `latency_ms` is `None` when no decrypt ran.
    pub fn record_success(&mut self, latency_ms: Option<f64>) {
        self.total += 1;
        self.success += 1;
        if let Some(ms) = latency_ms {
            self.timings.push(ms);
            self.timing_sum += ms;
            self.timing_count += 1;
        }
    }

    pub fn record_failure(&mut self) {
        self.total += 1;
        self.failed += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.timings.capacity());
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let window_len = self.timings.len();
        let avg_decrypt_ms = if window_len == 0 {
            0.0
        } else {
            self.timings.iter().sum::<f64>() / window_len as f64
        };
        let lifetime_avg_decrypt_ms = if self.timing_count == 0 {
            0.0
        } else {
            self.timing_sum / self.timing_count as f64
        };
        StatsSnapshot {
            total_packets: self.total,
            success_packets: self.success,
            failed_packets: self.failed,
            avg_decrypt_ms,
            lifetime_avg_decrypt_ms,
            timing_samples: window_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_add_up() {
        let mut stats = StatisticsTracker::new(100);
        for i in 0..10 {
            if i % 3 == 0 {
                stats.record_failure();
            } else {
                stats.record_success(Some(2.0));
            }
        }
        let snap = stats.snapshot();
        assert_eq!(snap.total_packets, 10);
        assert_eq!(snap.success_packets, 6);
        assert_eq!(snap.failed_packets, 4);
        assert_eq!(snap.total_packets, snap.success_packets + snap.failed_packets);
        assert!((snap.failure_ratio() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_window_and_lifetime_average() {
        let mut stats = StatisticsTracker::new(2);
        stats.record_success(Some(10.0));
        stats.record_success(Some(20.0));
        stats.record_success(Some(30.0));
        stats.record_success(None);
        let snap = stats.snapshot();
        assert_eq!(snap.timing_samples, 2);
        assert_eq!(snap.avg_decrypt_ms, 25.0);
        assert_eq!(snap.lifetime_avg_decrypt_ms, 20.0);
        assert_eq!(snap.success_packets, 4);
    }

    #[test]
    fn test_reset_keeps_window_size() {
        let mut stats = StatisticsTracker::new(3);
        stats.record_success(Some(1.0));
        stats.record_failure();
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
        for _ in 0..5 {
            stats.record_success(Some(1.0));
        }
        assert_eq!(stats.snapshot().timing_samples, 3);
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = StatisticsTracker::new(10).snapshot();
        assert_eq!(snap.avg_decrypt_ms, 0.0);
        assert_eq!(snap.failure_ratio(), 0.0);
    }
}
