//! Leaky Integrate-and-Fire neuron models.
//!
//! Two shapes share the same numeric core. [`LifSensor`] drives one node's
//! physical reading and honours the fleet-wide inhibition multiplier;
//! [`LifAggregator`] integrates incoming spikes at the gateway with no
//! refractory period and no suppression bookkeeping.

/// Outcome of one sensor step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepOutcome {
    /// The membrane crossed the effective threshold and the neuron fired.
    pub spike: bool,
    /// The membrane crossed the baseline threshold but stayed below the
    /// inhibited one: the spike was held back by inhibition.
    pub suppressed: bool,
}

/// Sensor-side LIF neuron.
///
/// The membrane decays by `leak` per step and accumulates the input
/// current. While the refractory countdown is running the neuron is
/// silent and the membrane is left untouched.
#[derive(Debug, Clone)]
pub struct LifSensor {
    leak: f64,
    theta_base: f64,
    rho: u32,
    u: f64,
    r: u32,
}

impl LifSensor {
    pub fn new(leak: f64, theta: f64, refractory: u32) -> Self {
        Self {
            leak,
            theta_base: theta,
            rho: refractory,
            u: 0.0,
            r: 0,
        }
    }

    /// Current membrane potential.
    pub fn membrane(&self) -> f64 {
        self.u
    }

    /// Baseline firing threshold.
    pub fn theta_base(&self) -> f64 {
        self.theta_base
    }

    /// Restore the freshly-constructed state.
    pub fn reset(&mut self) {
        self.u = 0.0;
        self.r = 0;
    }

    /// Advance one step with input current `input` under inhibition
    /// multiplier `beta` (1.0 means uninhibited).
    pub fn step(&mut self, input: f64, beta: f64) -> StepOutcome {
        if self.r > 0 {
            self.r -= 1;
            return StepOutcome::default();
        }
        let u_new = self.leak * self.u + input;
        let theta_eff = self.theta_base * beta;
        if u_new >= theta_eff {
            self.u = 0.0;
            self.r = self.rho;
            return StepOutcome {
                spike: true,
                suppressed: false,
            };
        }
        // A suppressed step keeps the accumulated potential.
        self.u = u_new;
        let suppressed = beta > 1.0 && u_new >= self.theta_base && u_new < theta_eff;
        StepOutcome {
            spike: false,
            suppressed,
        }
    }
}

/// Gateway-side LIF integrating the fleet's spike train.
#[derive(Debug, Clone)]
pub struct LifAggregator {
    leak: f64,
    theta: f64,
    v: f64,
}

impl LifAggregator {
    pub fn new(leak: f64, theta: f64) -> Self {
        Self { leak, theta, v: 0.0 }
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn potential(&self) -> f64 {
        self.v
    }

    pub fn reset(&mut self) {
        self.v = 0.0;
    }

    /// Integrate one input; returns true when the aggregator fires.
    pub fn step(&mut self, x: f64) -> bool {
        self.v = self.leak * self.v + x;
        if self.v >= self.theta {
            self.v = 0.0;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_fires_every_fifth_step_without_leak() {
        // leak 1.0, theta 10, constant input 2: u reaches 10 on step 5.
        let mut lif = LifSensor::new(1.0, 10.0, 0);
        for round in 0..3 {
            for step in 1..=5 {
                let out = lif.step(2.0, 1.0);
                assert_eq!(
                    out.spike,
                    step == 5,
                    "round {round} step {step}: unexpected spike state"
                );
                assert!(!out.suppressed);
            }
        }
    }

    #[test]
    fn firing_resets_membrane_and_starts_refractory() {
        let mut lif = LifSensor::new(1.0, 1.0, 3);
        let out = lif.step(5.0, 1.0);
        assert!(out.spike);
        assert_eq!(lif.membrane(), 0.0);

        // Three silent steps; the membrane is untouched.
        for _ in 0..3 {
            let out = lif.step(100.0, 1.0);
            assert!(!out.spike);
            assert!(!out.suppressed);
            assert_eq!(lif.membrane(), 0.0);
        }

        // Refractory over: the next strong input fires again.
        assert!(lif.step(100.0, 1.0).spike);
    }

    #[test]
    fn suppression_requires_active_inhibition() {
        // u' lands between theta_base and theta_base * beta.
        let mut lif = LifSensor::new(0.0, 1.0, 0);
        let out = lif.step(1.5, 2.0);
        assert!(!out.spike);
        assert!(out.suppressed);
        // Potential is retained on a suppressed step.
        assert_eq!(lif.membrane(), 1.5);

        // Same input with beta 1.0 fires outright.
        let mut lif = LifSensor::new(0.0, 1.0, 0);
        let out = lif.step(1.5, 1.0);
        assert!(out.spike);
        assert!(!out.suppressed);
    }

    #[test]
    fn subthreshold_step_is_not_suppressed() {
        let mut lif = LifSensor::new(0.0, 1.0, 0);
        let out = lif.step(0.5, 2.0);
        assert!(!out.spike);
        assert!(!out.suppressed);
        assert_eq!(lif.membrane(), 0.5);
    }

    #[test]
    fn inhibited_threshold_still_fires_above_it() {
        let mut lif = LifSensor::new(0.0, 1.0, 0);
        let out = lif.step(2.5, 2.0);
        assert!(out.spike);
        assert!(!out.suppressed);
    }

    #[test]
    fn sensor_reset_clears_state() {
        let mut lif = LifSensor::new(1.0, 10.0, 2);
        lif.step(4.0, 1.0);
        lif.reset();
        assert_eq!(lif.membrane(), 0.0);
        // No refractory leftover: a strong input fires immediately.
        assert!(lif.step(20.0, 1.0).spike);
    }

    #[test]
    fn aggregator_fires_on_threshold_and_resets() {
        let mut agg = LifAggregator::new(1.0, 3.0);
        assert!(!agg.step(1.0));
        assert!(!agg.step(1.0));
        assert!(agg.step(1.0));
        assert_eq!(agg.potential(), 0.0);
        assert!(!agg.step(1.0));
    }

    #[test]
    fn aggregator_leaks_between_spikes() {
        let mut agg = LifAggregator::new(0.5, 10.0);
        agg.step(4.0);
        agg.step(0.0);
        assert!((agg.potential() - 2.0).abs() < 1e-12);
    }
}
