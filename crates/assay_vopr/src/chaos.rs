//! Chaos injection for robustness testing.
//!
//! Provides controlled fault injection into experiment trials:
//! - Raised errors (trial returns `Err`)
//! - Panics (trial unwinds)
//! - Drift (trial returns a subtly wrong value)
//! - Latency (trial sleeps before answering)

use crate::subject::{checked_add, Arithmetic, MathError, Operands};
use assay_lab::Behavior;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

/// Configuration for chaos injection.
#[derive(Debug, Clone)]
pub struct ChaosConfig {
    /// Random seed for reproducible chaos.
    pub seed: u64,
    /// Probability of a trial returning an error (0.0 - 1.0).
    pub raise_rate: f64,
    /// Probability of a trial panicking (0.0 - 1.0).
    pub panic_rate: f64,
    /// Probability of a trial returning a drifted value (0.0 - 1.0).
    pub drift_rate: f64,
    /// Probability of a trial being slow (0.0 - 1.0).
    pub latency_rate: f64,
    /// Delay applied to slow trials.
    pub latency: Duration,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            raise_rate: 0.1,
            panic_rate: 0.1,
            drift_rate: 0.1,
            latency_rate: 0.0,
            latency: Duration::from_millis(1),
        }
    }
}

impl ChaosConfig {
    /// Creates a config with the given seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the raise, panic and drift rates at once.
    #[must_use]
    pub const fn with_fault_rate(mut self, rate: f64) -> Self {
        self.raise_rate = rate;
        self.panic_rate = rate;
        self.drift_rate = rate;
        self
    }

    /// Sets the latency rate and delay.
    #[must_use]
    pub const fn with_latency(mut self, rate: f64, latency: Duration) -> Self {
        self.latency_rate = rate;
        self.latency = latency;
        self
    }

    /// Creates a high-chaos config for stress testing.
    #[must_use]
    pub fn high_chaos() -> Self {
        Self {
            seed: 42,
            raise_rate: 0.3,
            panic_rate: 0.3,
            drift_rate: 0.3,
            latency_rate: 0.05,
            latency: Duration::from_millis(1),
        }
    }
}

/// A fault assigned to one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialFault {
    /// Behaves exactly like the control.
    None,
    /// Returns [`MathError::Injected`].
    Raise,
    /// Panics.
    Panic,
    /// Returns the correct value plus the given offset.
    Drift(i64),
    /// Returns the correct value after sleeping for the given milliseconds.
    Latency(u64),
}

impl TrialFault {
    /// Returns true if a trial with this fault should mismatch a healthy
    /// control under value equality.
    pub const fn should_mismatch(self) -> bool {
        match self {
            Self::None | Self::Latency(_) => false,
            Self::Raise | Self::Panic => true,
            Self::Drift(offset) => offset != 0,
        }
    }

    /// Builds an addition behavior exhibiting this fault.
    pub fn behavior(self) -> Behavior<Operands, i64, MathError> {
        match self {
            Self::None => Behavior::new(checked_add),
            Self::Raise => {
                Behavior::new(|_: &Operands| Err(MathError::Injected("raise".to_string())))
            }
            Self::Panic => Behavior::new(|_: &Operands| -> Result<i64, MathError> {
                panic!("injected panic")
            }),
            Self::Drift(offset) => Behavior::new(move |operands: &Operands| {
                checked_add(operands).map(|sum| sum.wrapping_add(offset))
            }),
            Self::Latency(ms) => Behavior::new(move |operands: &Operands| {
                std::thread::sleep(Duration::from_millis(ms));
                checked_add(operands)
            }),
        }
    }
}

/// Chaos injector for controlled fault injection.
pub struct ChaosInjector {
    config: ChaosConfig,
    rng: ChaCha8Rng,
}

impl ChaosInjector {
    /// Creates a new chaos injector.
    #[must_use]
    pub fn new(config: ChaosConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    /// Draws the fault for the next trial.
    pub fn next_fault(&mut self) -> TrialFault {
        if self.rng.gen_bool(self.config.raise_rate) {
            TrialFault::Raise
        } else if self.rng.gen_bool(self.config.panic_rate) {
            TrialFault::Panic
        } else if self.rng.gen_bool(self.config.drift_rate) {
            let magnitude = self.rng.gen_range(1..=1000);
            TrialFault::Drift(if self.rng.gen_bool(0.5) { magnitude } else { -magnitude })
        } else if self.rng.gen_bool(self.config.latency_rate) {
            #[allow(clippy::cast_possible_truncation)] // delays are a few milliseconds
            let ms = self.config.latency.as_millis() as u64;
            TrialFault::Latency(ms)
        } else {
            TrialFault::None
        }
    }

    /// Registers `count` trials with drawn faults on `experiment`.
    ///
    /// Returns the faults in trial-name order.
    pub fn infect(&mut self, experiment: &Arithmetic, count: usize) -> Vec<(String, TrialFault)> {
        (0..count)
            .map(|i| {
                let name = format!("trial-{i:03}");
                let fault = self.next_fault();
                experiment.trial_behavior(name.clone(), fault.behavior());
                (name, fault)
            })
            .collect()
    }

    /// Draws operands that never overflow the checked control.
    pub fn operands(&mut self) -> Operands {
        (
            self.rng.gen_range(-1_000_000..=1_000_000),
            self.rng.gen_range(-1_000_000..=1_000_000),
        )
    }
}

impl std::fmt::Debug for ChaosInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosInjector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::addition;

    #[test]
    fn chaos_injector_is_deterministic() {
        let config = ChaosConfig::high_chaos().with_seed(7);
        let mut injector1 = ChaosInjector::new(config.clone());
        let mut injector2 = ChaosInjector::new(config);

        let faults1: Vec<_> = (0..100).map(|_| injector1.next_fault()).collect();
        let faults2: Vec<_> = (0..100).map(|_| injector2.next_fault()).collect();
        assert_eq!(faults1, faults2);
    }

    #[test]
    fn zero_rates_inject_nothing() {
        let mut injector = ChaosInjector::new(ChaosConfig::default().with_fault_rate(0.0));
        assert!((0..100).all(|_| injector.next_fault() == TrialFault::None));
    }

    #[test]
    fn fault_behaviors() {
        assert_eq!(TrialFault::None.behavior().invoke(&(2, 3)), Ok(5));
        assert_eq!(TrialFault::Drift(-2).behavior().invoke(&(2, 3)), Ok(3));
        assert_eq!(TrialFault::Latency(0).behavior().invoke(&(2, 3)), Ok(5));
        assert!(matches!(
            TrialFault::Raise.behavior().invoke(&(2, 3)),
            Err(MathError::Injected(_))
        ));
        assert!(TrialFault::Raise.should_mismatch());
        assert!(!TrialFault::Drift(0).should_mismatch());
    }

    #[test]
    fn infected_experiment_still_returns_control() {
        let mut injector = ChaosInjector::new(ChaosConfig::high_chaos());
        let experiment = addition("chaos");
        let faults = injector.infect(&experiment, 20);
        assert_eq!(experiment.trial_names().len(), 20);

        let operands = injector.operands();
        assert_eq!(experiment.run(&operands).unwrap(), checked_add(&operands));

        let report = experiment.report(&operands).unwrap();
        for (name, fault) in faults {
            assert_eq!(
                report.mismatches().contains(&name),
                fault.should_mismatch(),
                "{name}: {fault:?}"
            );
        }
    }
}
