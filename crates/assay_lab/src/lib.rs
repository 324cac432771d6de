//! Parallel experiments for safely replacing production code paths.
//!
//! This crate provides:
//! - Experiments pairing a trusted control with candidate trials
//! - A laboratory that conducts experiments with full fault isolation
//! - Pluggable sampling (`Chance`) and equivalence (`Matcher`) policies
//! - Reports of every outcome, published to journals
//!
//! # Example
//!
//! ```rust,ignore
//! use assay_lab::Laboratory;
//!
//! let lab = Laboratory::new().with_journal(assay_lab::TracingJournal);
//! let experiment = lab.experiment::<(i64, i64), i64, String>("add")?;
//! experiment
//!     .control(|(a, b)| Ok(a + b))
//!     .trial("buggy", |(a, b)| Ok(a - b));
//!
//! // Returns the control's result; the mismatch is journaled.
//! assert_eq!(experiment.run(&(2, 3))?, Ok(5));
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod chance;
pub mod config;
pub mod error;
pub mod experiment;
pub mod journal;
pub mod laboratory;
pub mod matcher;
pub mod observation;
pub mod report;
pub mod trial;

pub use chance::{AlwaysRun, Chance, NeverRun, Probability};
pub use config::{ExperimentConfig, ExperimentSettings, LabConfig};
pub use error::{Error, Result};
pub use experiment::{ExecutionMode, Experiment};
pub use journal::{
    FailingJournal, Journal, Journals, JsonLinesJournal, MemoryJournal, TracingJournal,
};
pub use laboratory::Laboratory;
pub use matcher::{Matcher, OutcomeMatcher, ValueMatcher};
pub use observation::{Failure, Observation};
pub use report::{ObservationDigest, OutcomeStatus, Report, ReportDigest};
pub use trial::{Behavior, Callback, Trial};
