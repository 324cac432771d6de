//! Laboratory configuration.
//!
//! Controls how much traffic each experiment samples, loaded from YAML or
//! JSON:
//!
//! ```yaml
//! enabled: true
//! default_percentage: 100
//! seed: 42
//! mode: sequential
//! experiments:
//!   checkout-total:
//!     percentage: 10
//!   search-ranking:
//!     enabled: false
//!     mode: parallel
//! ```

use crate::chance::{AlwaysRun, Chance, NeverRun, Probability};
use crate::error::{Error, Result};
use crate::experiment::ExecutionMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use xxhash_rust::xxh64::xxh64;

/// Configuration of a [`Laboratory`](crate::Laboratory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabConfig {
    /// Global switch. When false no trial ever runs.
    pub enabled: bool,
    /// Sampling percentage for experiments without an override.
    pub default_percentage: u8,
    /// Seed for reproducible sampling. Entropy is used when absent.
    pub seed: Option<u64>,
    /// Default execution mode.
    pub mode: ExecutionMode,
    /// Per-experiment overrides, keyed by experiment name.
    pub experiments: BTreeMap<String, ExperimentConfig>,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_percentage: 100,
            seed: None,
            mode: ExecutionMode::Sequential,
            experiments: BTreeMap::new(),
        }
    }
}

/// Overrides for a single experiment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Sampling percentage.
    pub percentage: Option<u8>,
    /// Whether trials may run at all.
    pub enabled: Option<bool>,
    /// Execution mode.
    pub mode: Option<ExecutionMode>,
}

/// Effective settings for one experiment after applying overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExperimentSettings {
    /// Whether trials may run.
    pub enabled: bool,
    /// Sampling percentage.
    pub percentage: u8,
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Seed for the sampling generator.
    pub seed: Option<u64>,
}

impl ExperimentSettings {
    /// Builds the chance policy matching these settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the percentage is above 100.
    pub fn chance(&self) -> Result<Arc<dyn Chance>> {
        if !self.enabled || self.percentage == 0 {
            return Ok(Arc::new(NeverRun));
        }
        if self.percentage == 100 {
            return Ok(Arc::new(AlwaysRun));
        }
        let probability = Probability::percent(self.percentage)?;
        Ok(match self.seed {
            Some(seed) => Arc::new(probability.seeded(seed)),
            None => Arc::new(probability),
        })
    }
}

impl LabConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the global switch.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the default sampling percentage.
    #[must_use]
    pub const fn with_default_percentage(mut self, percentage: u8) -> Self {
        self.default_percentage = percentage;
        self
    }

    /// Sets the sampling seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the default execution mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Adds or replaces an experiment override.
    #[must_use]
    pub fn with_experiment(mut self, name: impl Into<String>, config: ExperimentConfig) -> Self {
        self.experiments.insert(name.into(), config);
        self
    }

    /// Parses and validates a YAML configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or the values are invalid.
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the values are invalid.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file, choosing the format from its extension.
    ///
    /// `.json` files are parsed as JSON, everything else as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading laboratory config from {}", path.display());
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    /// Checks that every percentage is within `0..=100`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.default_percentage > 100 {
            return Err(Error::Config(format!(
                "default_percentage {} is above 100",
                self.default_percentage
            )));
        }
        for (name, experiment) in &self.experiments {
            if let Some(percentage) = experiment.percentage {
                if percentage > 100 {
                    return Err(Error::Config(format!(
                        "experiment '{name}': percentage {percentage} is above 100"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Returns the effective settings for the named experiment.
    pub fn settings_for(&self, name: &str) -> ExperimentSettings {
        let overrides = self.experiments.get(name).cloned().unwrap_or_default();
        ExperimentSettings {
            enabled: self.enabled && overrides.enabled.unwrap_or(true),
            percentage: overrides.percentage.unwrap_or(self.default_percentage),
            mode: overrides.mode.unwrap_or(self.mode),
            seed: self.seed.map(|seed| seed ^ xxh64(name.as_bytes(), 0)),
        }
    }
}
