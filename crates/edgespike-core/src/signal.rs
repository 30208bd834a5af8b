//! Synthetic physical signal driving each sensor.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

/// Source of the scalar reading a node samples once per step.
pub trait ValueSource: Send {
    fn sample(&mut self, step: u64) -> f64;
}

/// Slow sine carrier around 50 with unit Gaussian noise on top, standing
/// in for a real physical quantity with an hourly swing.
pub struct SyntheticSignal {
    step_s: f64,
    rng: StdRng,
    noise: Normal<f64>,
}

impl SyntheticSignal {
    const BASE: f64 = 50.0;
    const AMPLITUDE: f64 = 10.0;
    const PERIOD_S: f64 = 3600.0;

    /// `step_s` is the simulated duration of one step; the carrier phase
    /// advances in simulated time even when the run is accelerated.
    pub fn new(step_s: f64) -> Self {
        Self::with_rng(step_s, StdRng::from_os_rng())
    }

    /// Deterministic variant for reproducible runs.
    pub fn seeded(step_s: f64, seed: u64) -> Self {
        Self::with_rng(step_s, StdRng::seed_from_u64(seed))
    }

    fn with_rng(step_s: f64, rng: StdRng) -> Self {
        Self {
            step_s,
            rng,
            noise: Normal::new(0.0, 1.0).expect("unit normal is valid"),
        }
    }
}

impl ValueSource for SyntheticSignal {
    fn sample(&mut self, step: u64) -> f64 {
        let t = step as f64 * self.step_s;
        let carrier = Self::BASE
            + Self::AMPLITUDE * (2.0 * std::f64::consts::PI * t / Self::PERIOD_S).sin();
        carrier + self.noise.sample(&mut self.rng)
    }
}
