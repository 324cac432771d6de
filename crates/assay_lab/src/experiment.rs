//! Experiment definition: one control, any number of named trials.
//!
//! # Example
//!
//! ```rust,ignore
//! use assay_lab::Experiment;
//!
//! let experiment = Experiment::<(i64, i64), i64, String>::new("add");
//! experiment
//!     .control(|(a, b)| Ok(a + b))
//!     .trial("buggy", |(a, b)| Ok(a - b));
//!
//! // Behaves exactly like the control.
//! assert_eq!(experiment.run(&(2, 3))?, Ok(5));
//!
//! // Full visibility into every outcome.
//! let report = experiment.report(&(2, 3))?;
//! assert!(report.mismatches().contains("buggy"));
//! ```

use crate::chance::{AlwaysRun, Chance};
use crate::error::{Error, Result};
use crate::journal::Journals;
use crate::laboratory::{self, ControlGuard};
use crate::matcher::{Matcher, ValueMatcher};
use crate::report::Report;
use crate::trial::{Behavior, Callback, Trial};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// How trials are scheduled relative to the control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Control first, then each trial, all on the caller's thread.
    #[default]
    Sequential,
    /// Each trial on its own scoped thread while the control runs on the
    /// caller's thread. The call returns once every trial finished.
    Parallel,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

/// Configuration of an experiment at one point in time.
pub(crate) struct Setup<A, T, E> {
    pub(crate) control: Option<Behavior<A, T, E>>,
    pub(crate) trials: BTreeMap<String, Trial<A, T, E>>,
    pub(crate) matcher: Arc<dyn Matcher<T, E>>,
    pub(crate) chance: Arc<dyn Chance>,
    pub(crate) mode: ExecutionMode,
}

impl<A, T, E> Clone for Setup<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            control: self.control.clone(),
            trials: self.trials.clone(),
            matcher: Arc::clone(&self.matcher),
            chance: Arc::clone(&self.chance),
            mode: self.mode,
        }
    }
}

/// A control behavior compared against candidate trials.
///
/// Configuration methods take `&self` so an experiment shared through the
/// [`Laboratory`](crate::Laboratory) registry can be configured from any
/// handle. Each `run`/`report` works on a snapshot of the configuration, so
/// callbacks never execute while the configuration lock is held.
pub struct Experiment<A, T, E> {
    name: String,
    setup: RwLock<Setup<A, T, E>>,
    journals: Journals,
}

impl<A, T, E> Experiment<A, T, E>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Creates an experiment compared with [`ValueMatcher`].
    pub fn new(name: impl Into<String>) -> Self
    where
        T: PartialEq,
    {
        Self::with_matcher(name, ValueMatcher)
    }

    /// Creates an experiment with a custom matcher.
    ///
    /// Needed when the value type has no `PartialEq`.
    pub fn with_matcher<M>(name: impl Into<String>, matcher: M) -> Self
    where
        M: Matcher<T, E> + 'static,
    {
        Self {
            name: name.into(),
            setup: RwLock::new(Setup {
                control: None,
                trials: BTreeMap::new(),
                matcher: Arc::new(matcher),
                chance: Arc::new(AlwaysRun),
                mode: ExecutionMode::Sequential,
            }),
            journals: Journals::new(),
        }
    }

    /// Publishes every report of this experiment to `journals`.
    #[must_use]
    pub fn with_journals(mut self, journals: Journals) -> Self {
        self.journals = journals;
        self
    }

    /// Returns the experiment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers the control, replacing any previous one.
    pub fn control<F>(&self, callback: F) -> &Self
    where
        F: Fn(&A) -> std::result::Result<T, E> + Send + Sync + 'static,
    {
        self.control_behavior(Behavior::new(callback))
    }

    /// Registers the control from a behavior carrying context or bound
    /// arguments, replacing any previous one.
    pub fn control_behavior(&self, behavior: Behavior<A, T, E>) -> &Self {
        self.write().control = Some(behavior);
        self
    }

    /// Returns true once a control is registered.
    pub fn has_control(&self) -> bool {
        self.read().control.is_some()
    }

    /// Registers a trial. A trial with the same name is replaced.
    pub fn trial<F>(&self, name: impl Into<String>, callback: F) -> &Self
    where
        F: Fn(&A) -> std::result::Result<T, E> + Send + Sync + 'static,
    {
        self.trial_behavior(name, Behavior::new(callback))
    }

    /// Registers a trial from a behavior. A trial with the same name is
    /// replaced.
    pub fn trial_behavior(&self, name: impl Into<String>, behavior: Behavior<A, T, E>) -> &Self {
        let name = name.into();
        let trial = Trial::new(name.clone(), behavior);
        if self.write().trials.insert(name.clone(), trial).is_some() {
            debug!("Experiment '{}': replaced trial '{}'", self.name, name);
        }
        self
    }

    /// Returns the callback of the named trial.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTrial`] if no trial has that name.
    pub fn get_trial(&self, name: &str) -> Result<Callback<A, T, E>> {
        self.read()
            .trials
            .get(name)
            .map(|trial| Arc::clone(trial.callback()))
            .ok_or_else(|| Error::unknown_trial(&self.name, name))
    }

    /// Returns the registered trial names in execution order.
    pub fn trial_names(&self) -> Vec<String> {
        self.read().trials.keys().cloned().collect()
    }

    /// Replaces the matcher.
    pub fn matcher<M>(&self, matcher: M) -> &Self
    where
        M: Matcher<T, E> + 'static,
    {
        self.write().matcher = Arc::new(matcher);
        self
    }

    /// Replaces the chance policy.
    pub fn chance<C>(&self, chance: C) -> &Self
    where
        C: Chance + 'static,
    {
        self.set_chance(Arc::new(chance))
    }

    /// Replaces the chance policy with a shared one.
    pub fn set_chance(&self, chance: Arc<dyn Chance>) -> &Self {
        self.write().chance = chance;
        self
    }

    /// Sets the execution mode.
    pub fn mode(&self, mode: ExecutionMode) -> &Self {
        self.write().mode = mode;
        self
    }

    /// Returns the execution mode.
    pub fn execution_mode(&self) -> ExecutionMode {
        self.read().mode
    }

    /// Asks the chance policy whether trials should run.
    pub fn should_run(&self) -> bool {
        let chance = Arc::clone(&self.read().chance);
        chance.should_run()
    }

    pub(crate) fn snapshot(&self) -> Setup<A, T, E> {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Setup<A, T, E>> {
        self.setup.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Setup<A, T, E>> {
        self.setup.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A, T, E> Experiment<A, T, E>
where
    A: Send + Sync + 'static,
    T: fmt::Debug + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    /// Runs the experiment and returns exactly what the control returned.
    ///
    /// Trials run as an invisible side effect: their errors and panics are
    /// captured, never propagated. A panicking control panics out of `run`
    /// as a direct call would. Captured panics still pass through the
    /// process panic hook, which by default prints them to stderr.
    ///
    /// # Errors
    ///
    /// The outer error is [`Error::MissingControl`] when no control is
    /// registered. The inner result is the control's own result.
    pub fn run(&self, args: &A) -> Result<std::result::Result<T, E>> {
        laboratory::run(self, args, &self.journals)
    }

    /// Runs the experiment and returns the full report.
    ///
    /// Control errors and panics are recorded in the report, never raised.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingControl`] when no control is registered.
    pub fn report(&self, args: &A) -> Result<Report<T, E>> {
        laboratory::conduct(self, args, &self.journals, ControlGuard::Capture)
    }
}

impl<A, T, E> fmt::Debug for Experiment<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let setup = self.setup.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Experiment")
            .field("name", &self.name)
            .field("has_control", &setup.control.is_some())
            .field("trials", &setup.trials.keys().collect::<Vec<_>>())
            .field("mode", &setup.mode)
            .finish_non_exhaustive()
    }
}
