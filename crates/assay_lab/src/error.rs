//! Error types for laboratory operations.
//!
//! These cover misconfiguration only. Errors raised by control or trial
//! callbacks are never turned into [`Error`]; they are captured as
//! [`Failure`](crate::observation::Failure) values inside observations.

use thiserror::Error;

/// Errors that can occur while configuring or conducting experiments.
#[derive(Debug, Error)]
pub enum Error {
    /// `run` or `report` was called before a control was registered.
    #[error("experiment '{experiment}' has no control behavior")]
    MissingControl {
        /// Name of the experiment.
        experiment: String,
    },

    /// A trial lookup used a name that is not registered.
    #[error("experiment '{experiment}' has no trial named '{trial}'")]
    UnknownTrial {
        /// Name of the experiment.
        experiment: String,
        /// The trial name that was requested.
        trial: String,
    },

    /// The registry holds an experiment under this name with different
    /// argument, value or error types.
    #[error("experiment '{name}' is already registered with a different signature")]
    SignatureMismatch {
        /// Name of the experiment.
        name: String,
    },

    /// A sampling probability or percentage is out of range.
    #[error("invalid chance: {0}")]
    InvalidChance(String),

    /// Laboratory configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A journal failed to record a report.
    #[error("journal error: {0}")]
    Journal(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML error.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Creates a missing control error for the given experiment.
    pub fn missing_control(experiment: impl Into<String>) -> Self {
        Self::MissingControl {
            experiment: experiment.into(),
        }
    }

    /// Creates an unknown trial error.
    pub fn unknown_trial(experiment: impl Into<String>, trial: impl Into<String>) -> Self {
        Self::UnknownTrial {
            experiment: experiment.into(),
            trial: trial.into(),
        }
    }
}

/// Result type alias for laboratory operations.
pub type Result<T> = std::result::Result<T, Error>;
