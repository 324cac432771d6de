//! Report aggregating every observation of one experiment invocation.

use crate::matcher::Matcher;
use crate::observation::{panic_message, Failure, Observation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

/// Outcome of one `run`/`report` invocation.
///
/// The mismatch set is computed once, when the report is built.
#[derive(Debug, Clone)]
pub struct Report<T, E> {
    experiment: String,
    sampled: bool,
    control: Observation<T, E>,
    trials: BTreeMap<String, Observation<T, E>>,
    mismatches: BTreeSet<String>,
}

impl<T, E> Report<T, E> {
    /// Builds a report, classifying every trial with `matcher`.
    ///
    /// A matcher that panics on a trial counts that trial as a mismatch.
    pub fn new(
        experiment: impl Into<String>,
        sampled: bool,
        control: Observation<T, E>,
        trials: Vec<Observation<T, E>>,
        matcher: &dyn Matcher<T, E>,
    ) -> Self {
        let experiment = experiment.into();
        let mismatches = trials
            .iter()
            .filter(|trial| !guarded_match(&experiment, matcher, &control, trial))
            .map(|trial| trial.name().to_string())
            .collect();
        let trials = trials
            .into_iter()
            .map(|trial| (trial.name().to_string(), trial))
            .collect();

        Self {
            experiment,
            sampled,
            control,
            trials,
            mismatches,
        }
    }

    /// Returns the experiment name.
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Returns true if the chance gate let the trials run.
    pub const fn sampled(&self) -> bool {
        self.sampled
    }

    /// Returns the control observation.
    pub const fn control(&self) -> &Observation<T, E> {
        &self.control
    }

    /// Returns all trial observations, keyed by trial name.
    pub const fn trials(&self) -> &BTreeMap<String, Observation<T, E>> {
        &self.trials
    }

    /// Returns the observation of a single trial.
    pub fn trial(&self, name: &str) -> Option<&Observation<T, E>> {
        self.trials.get(name)
    }

    /// Returns the names of trials that did not match the control.
    pub const fn mismatches(&self) -> &BTreeSet<String> {
        &self.mismatches
    }

    /// Returns true if the named trial ran and matched the control.
    pub fn is_match(&self, name: &str) -> bool {
        self.trials.contains_key(name) && !self.mismatches.contains(name)
    }

    /// Returns true if any trial mismatched.
    pub fn has_mismatches(&self) -> bool {
        !self.mismatches.is_empty()
    }

    /// Returns the control outcome.
    pub const fn control_outcome(&self) -> &Result<T, Failure<E>> {
        self.control.outcome()
    }

    /// Consumes the report and returns the control outcome.
    pub fn into_control_outcome(self) -> Result<T, Failure<E>> {
        self.control.into_outcome()
    }
}

impl<T: fmt::Debug, E: fmt::Display> Report<T, E> {
    /// Renders the report into a serializable digest for journals.
    pub fn digest(&self) -> ReportDigest {
        ReportDigest {
            experiment: self.experiment.clone(),
            sampled: self.sampled,
            control: ObservationDigest::from_observation(&self.control, None),
            trials: self
                .trials
                .values()
                .map(|trial| {
                    let matched = !self.mismatches.contains(trial.name());
                    ObservationDigest::from_observation(trial, Some(matched))
                })
                .collect(),
            mismatches: self.mismatches.iter().cloned().collect(),
        }
    }
}

fn guarded_match<T, E>(
    experiment: &str,
    matcher: &dyn Matcher<T, E>,
    control: &Observation<T, E>,
    trial: &Observation<T, E>,
) -> bool {
    panic::catch_unwind(AssertUnwindSafe(|| matcher.matches(control, trial))).unwrap_or_else(
        |payload| {
            warn!(
                "Experiment '{}': matcher panicked on trial '{}': {}",
                experiment,
                trial.name(),
                panic_message(payload.as_ref())
            );
            false
        },
    )
}

/// How an observed call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Returned a value.
    Value,
    /// Returned an error.
    Error,
    /// Panicked.
    Panic,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => write!(f, "value"),
            Self::Error => write!(f, "error"),
            Self::Panic => write!(f, "panic"),
        }
    }
}

/// Serializable rendering of an [`Observation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationDigest {
    /// Name of the control (experiment name) or trial.
    pub name: String,
    /// How the call ended.
    pub status: OutcomeStatus,
    /// Debug rendering of the value, or the error / panic message.
    pub detail: String,
    /// When the call started.
    pub started_at: DateTime<Utc>,
    /// Elapsed time in microseconds.
    pub duration_us: u64,
    /// Whether the trial matched the control. Absent for the control.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<bool>,
}

impl ObservationDigest {
    fn from_observation<T: fmt::Debug, E: fmt::Display>(
        observation: &Observation<T, E>,
        matched: Option<bool>,
    ) -> Self {
        let (status, detail) = match observation.outcome() {
            Ok(value) => (OutcomeStatus::Value, format!("{value:?}")),
            Err(Failure::Raised(e)) => (OutcomeStatus::Error, e.to_string()),
            Err(Failure::Panicked(message)) => (OutcomeStatus::Panic, message.clone()),
        };

        Self {
            name: observation.name().to_string(),
            status,
            detail,
            started_at: observation.started_at(),
            duration_us: u64::try_from(observation.duration().as_micros()).unwrap_or(u64::MAX),
            matched,
        }
    }
}

/// Serializable, type-erased rendering of a [`Report`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDigest {
    /// Experiment name.
    pub experiment: String,
    /// Whether the trials ran.
    pub sampled: bool,
    /// The control observation.
    pub control: ObservationDigest,
    /// Trial observations, ordered by name.
    pub trials: Vec<ObservationDigest>,
    /// Names of mismatching trials, sorted.
    pub mismatches: Vec<String>,
}

impl ReportDigest {
    /// Returns true if any trial mismatched.
    pub fn has_mismatches(&self) -> bool {
        !self.mismatches.is_empty()
    }

    /// Serializes the digest to a single JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::ValueMatcher;
    use std::time::Duration;

    fn obs(name: &str, outcome: Result<i32, Failure<String>>) -> Observation<i32, String> {
        Observation::new(name, outcome, Utc::now(), Duration::from_micros(250))
    }

    fn sample_report() -> Report<i32, String> {
        Report::new(
            "add",
            true,
            obs("add", Ok(5)),
            vec![
                obs("double-add", Ok(5)),
                obs("buggy", Ok(-1)),
                obs("crashy", Err(Failure::Panicked("boom".to_string()))),
            ],
            &ValueMatcher,
        )
    }

    #[test]
    fn mismatches_computed_at_build() {
        let report = sample_report();
        assert_eq!(report.experiment(), "add");
        assert_eq!(report.trials().len(), 3);
        let expected: BTreeSet<String> =
            ["buggy", "crashy"].iter().map(ToString::to_string).collect();
        assert_eq!(report.mismatches(), &expected);
        assert!(report.is_match("double-add"));
        assert!(!report.is_match("buggy"));
        assert!(!report.is_match("missing"));
        assert!(report.has_mismatches());
    }

    #[test]
    fn panicking_matcher_counts_as_mismatch() {
        let within_one = |control: &Observation<i32, String>, trial: &Observation<i32, String>| {
            match (control.value(), trial.value()) {
                (Some(x), Some(y)) => (x - y).abs() <= 1,
                _ => false,
            }
        };
        let report = Report::new(
            "add",
            true,
            obs("add", Ok(5)),
            vec![obs("close", Ok(6)), obs("extreme", Ok(i32::MIN))],
            &within_one,
        );
        assert!(report.is_match("close"));
        assert!(!report.is_match("extreme"));
        assert_eq!(report.mismatches().len(), 1);
    }

    #[test]
    fn control_outcome_is_preserved() {
        let report = sample_report();
        assert_eq!(report.control_outcome(), &Ok(5));
        assert_eq!(report.into_control_outcome(), Ok(5));
    }

    #[test]
    fn digest_renders_every_observation() {
        let digest = sample_report().digest();
        assert_eq!(digest.experiment, "add");
        assert!(digest.sampled);
        assert_eq!(digest.control.status, OutcomeStatus::Value);
        assert_eq!(digest.control.detail, "5");
        assert_eq!(digest.control.matched, None);
        assert_eq!(digest.control.duration_us, 250);

        let names: Vec<&str> = digest.trials.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["buggy", "crashy", "double-add"]);

        let crashy = &digest.trials[1];
        assert_eq!(crashy.status, OutcomeStatus::Panic);
        assert_eq!(crashy.detail, "boom");
        assert_eq!(crashy.matched, Some(false));
        assert_eq!(digest.trials[2].matched, Some(true));
        assert_eq!(digest.mismatches, vec!["buggy".to_string(), "crashy".to_string()]);
    }

    #[test]
    fn digest_json_roundtrip() {
        let digest = sample_report().digest();
        let json = digest.to_json().unwrap();
        assert!(!json.contains('\n'));
        assert!(!json.contains("\"matched\":null"));
        let parsed: ReportDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, digest);
    }
}
