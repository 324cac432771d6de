//! Sampling gate deciding whether trials run at all.
//!
//! # Example
//!
//! ```rust,ignore
//! use assay_lab::chance::{Chance, Probability};
//!
//! // Run trials for roughly one call in ten, reproducibly.
//! let chance = Probability::percent(10)?.seeded(42);
//! let sampled = (0..1000).filter(|_| chance.should_run()).count();
//! ```

use crate::error::{Error, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Decides, per invocation, whether the trials of an experiment execute.
pub trait Chance: Send + Sync {
    /// Returns true when trials should run for this invocation.
    fn should_run(&self) -> bool;
}

impl<F> Chance for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn should_run(&self) -> bool {
        self()
    }
}

/// Runs every trial on every invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlwaysRun;

impl Chance for AlwaysRun {
    fn should_run(&self) -> bool {
        true
    }
}

/// Never runs trials. Used to switch an experiment off without removing it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeverRun;

impl Chance for NeverRun {
    fn should_run(&self) -> bool {
        false
    }
}

/// Runs trials with a fixed probability.
pub struct Probability {
    probability: f64,
    rng: Mutex<ChaCha8Rng>,
}

impl Probability {
    /// Creates a gate that opens with probability `probability`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidChance`] unless `probability` is within `0.0..=1.0`.
    pub fn new(probability: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(Error::InvalidChance(format!(
                "probability {probability} is outside 0.0..=1.0"
            )));
        }
        Ok(Self {
            probability,
            rng: Mutex::new(ChaCha8Rng::from_entropy()),
        })
    }

    /// Creates a gate that opens for `percent` invocations out of a hundred.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidChance`] if `percent` is above 100.
    pub fn percent(percent: u8) -> Result<Self> {
        if percent > 100 {
            return Err(Error::InvalidChance(format!(
                "percentage {percent} is above 100"
            )));
        }
        Self::new(f64::from(percent) / 100.0)
    }

    /// Replaces the entropy-seeded generator with a deterministic one.
    #[must_use]
    pub fn seeded(self, seed: u64) -> Self {
        Self {
            probability: self.probability,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// Returns the configured probability.
    #[must_use]
    pub const fn probability(&self) -> f64 {
        self.probability
    }
}

impl fmt::Debug for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probability")
            .field("probability", &self.probability)
            .finish_non_exhaustive()
    }
}

impl Chance for Probability {
    fn should_run(&self) -> bool {
        // Skip the generator at the edges so 0% and 100% are exact.
        if self.probability <= 0.0 {
            return false;
        }
        if self.probability >= 1.0 {
            return true;
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_bool(self.probability)
    }
}
