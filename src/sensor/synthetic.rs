use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Axis3, SensorEnvelope};

/// Produces plausible MPU-style readings when no live sample is available.
///
/// Accel in [-2, 2) g and gyro in [-250, 250) deg/s, both to 3 decimals;
/// temperature 23 +/- 1 C to 1 decimal.
#[derive(Debug)]
pub struct SyntheticGenerator {
    rng: StdRng,
}

impl Default for SyntheticGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl SyntheticGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn axis(&mut self, span: f64, decimals: i32) -> Axis3 {
        let mut next = || round_to(self.rng.gen_range(-span..span), decimals);
        Axis3 {
            x: next(),
            y: next(),
            z: next(),
        }
    }

    pub fn sample(&mut self) -> SensorEnvelope {
        let accel = self.axis(2.0, 3);
        let gyro = self.axis(250.0, 3);
        let temp = round_to(23.0 + self.rng.gen_range(-1.0..1.0), 1);
        SensorEnvelope {
            accel,
            gyro,
            temp,
            timestamp: Some(Utc::now().timestamp_millis()),
        }
    }
}
