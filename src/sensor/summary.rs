//! Per-axis statistics and CSV export over decrypted samples.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::SensorEnvelope;

pub const CSV_HEADER: &str = "Timestamp,Accel_X,Accel_Y,Accel_Z,Gyro_X,Gyro_Y,Gyro_Z,Temperature";

/// min/max/avg/rms of one axis. All zero for an empty series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AxisStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub rms: f64,
}

impl AxisStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = values.iter().sum::<f64>() / n;
        let rms = (values.iter().map(|v| v * v).sum::<f64>() / n).sqrt();
        Self { min, max, avg, rms }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorSummary {
    pub samples: usize,
    pub accel: [AxisStats; 3],
    pub gyro: [AxisStats; 3],
    pub temp: AxisStats,
}

impl SensorSummary {
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a SensorEnvelope>) -> Self {
        let samples: Vec<&SensorEnvelope> = samples.into_iter().collect();
        let column = |f: &dyn Fn(&SensorEnvelope) -> f64| {
            AxisStats::from_values(&samples.iter().map(|&s| f(s)).collect::<Vec<_>>())
        };
        Self {
            samples: samples.len(),
            accel: [
                column(&|s| s.accel.x),
                column(&|s| s.accel.y),
                column(&|s| s.accel.z),
            ],
            gyro: [
                column(&|s| s.gyro.x),
                column(&|s| s.gyro.y),
                column(&|s| s.gyro.z),
            ],
            temp: column(&|s| s.temp),
        }
    }
}

/// Render rows as CSV with an RFC 3339 timestamp column.
pub fn to_csv<'a>(rows: impl IntoIterator<Item = (DateTime<Utc>, &'a SensorEnvelope)>) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for (at, s) in rows {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            at.to_rfc3339_opts(SecondsFormat::Millis, true),
            s.accel.x,
            s.accel.y,
            s.accel.z,
            s.gyro.x,
            s.gyro.y,
            s.gyro.z,
            s.temp,
        ));
    }
    out
}
