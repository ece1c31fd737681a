//! Sensor envelope carried inside decrypted telemetry, plus the synthetic
//! generator used when the live source is unavailable.

mod summary;
mod synthetic;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use summary::{to_csv, AxisStats, SensorSummary, CSV_HEADER};
pub use synthetic::SyntheticGenerator;

/// Three-axis reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Axis3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Decrypted payload: `{accel:{x,y,z}, gyro:{x,y,z}, temp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEnvelope {
    pub accel: Axis3,
    pub gyro: Axis3,
    pub temp: f64,
    /// Milliseconds since the Unix epoch, when the producer stamped one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Decrypted payload is not a sensor envelope: {0}")]
    Parse(String),
}

impl SensorEnvelope {
    pub fn from_json(text: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(text).map_err(|e| EnvelopeError::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        // Plain numeric fields only; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_envelope() {
        let text = r#"{"accel":{"x":0.1,"y":-0.2,"z":0.98},"gyro":{"x":1,"y":2,"z":3},"temp":23.4}"#;
        let env = SensorEnvelope::from_json(text).unwrap();
        assert_eq!(env.accel.z, 0.98);
        assert_eq!(env.gyro.y, 2.0);
        assert_eq!(env.temp, 23.4);
        assert!(env.timestamp.is_none());
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        assert!(SensorEnvelope::from_json(r#"{"accel":{"x":0,"y":0,"z":0},"temp":1}"#).is_err());
        assert!(SensorEnvelope::from_json("not json").is_err());
        assert!(SensorEnvelope::from_json(r#"{"accel":{"x":"a","y":0,"z":0},"gyro":{"x":0,"y":0,"z":0},"temp":1}"#).is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_timestamp() {
        let env = SensorEnvelope {
            accel: Axis3 { x: 1.0, y: 2.0, z: 3.0 },
            gyro: Axis3::default(),
            temp: 22.5,
            timestamp: Some(1_700_000_000_000),
        };
        assert_eq!(SensorEnvelope::from_json(&env.to_json()).unwrap(), env);
    }
}
