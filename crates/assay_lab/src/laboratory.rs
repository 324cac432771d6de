//! The laboratory: registry of named experiments and the protocol that
//! conducts them.
//!
//! # Protocol
//!
//! 1. Invoke the control with its bound arguments or the call arguments,
//!    capturing an observation.
//! 2. If the chance policy allows it, invoke every trial the same way. Each
//!    trial is isolated: errors and panics are captured in its observation.
//! 3. Build the report, classifying every trial with the matcher.
//! 4. Publish the report digest to the journals.
//!
//! `run` then hands back the control's own result; `report` returns the
//! report itself.

use crate::config::LabConfig;
use crate::error::{Error, Result};
use crate::experiment::{ExecutionMode, Experiment};
use crate::journal::{Journal, Journals};
use crate::matcher::{Matcher, ValueMatcher};
use crate::observation::{panic_message, Failure, Observation};
use crate::report::Report;
use crate::trial::{Behavior, Trial};
use chrono::Utc;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// What happens when the control panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlGuard {
    /// Let the panic unwind to the caller (`run`).
    Unwind,
    /// Record the panic in the control observation (`report`).
    Capture,
}

type Registered = Arc<dyn Any + Send + Sync>;

/// Registry of experiments keyed by name, plus the journals every report
/// is published to.
pub struct Laboratory {
    config: LabConfig,
    registry: RwLock<HashMap<String, Registered>>,
    journals: Journals,
}

impl Default for Laboratory {
    fn default() -> Self {
        Self {
            config: LabConfig::default(),
            registry: RwLock::new(HashMap::new()),
            journals: Journals::new(),
        }
    }
}

impl Laboratory {
    /// Creates a laboratory with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a laboratory with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn with_config(config: LabConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    /// Adds a journal, builder style.
    #[must_use]
    pub fn with_journal(self, journal: impl Journal + 'static) -> Self {
        self.add_journal(Arc::new(journal));
        self
    }

    /// Adds a journal. Experiments created earlier publish to it too.
    pub fn add_journal(&self, journal: Arc<dyn Journal>) {
        self.journals.add(journal);
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &LabConfig {
        &self.config
    }

    /// Returns the journals.
    pub const fn journals(&self) -> &Journals {
        &self.journals
    }

    /// Returns the experiment registered under `name`, creating it on first
    /// access.
    ///
    /// The same name always yields the same instance, so configuration
    /// applied through one handle is visible through every other. A new
    /// experiment gets the chance policy and execution mode the
    /// configuration assigns to its name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SignatureMismatch`] if `name` is registered with
    /// different argument, value or error types.
    pub fn experiment<A, T, E>(&self, name: &str) -> Result<Arc<Experiment<A, T, E>>>
    where
        A: Send + Sync + 'static,
        T: PartialEq + Send + 'static,
        E: Send + 'static,
    {
        self.experiment_with_matcher(name, ValueMatcher)
    }

    /// Like [`experiment`](Self::experiment), comparing a newly created
    /// experiment with `matcher`. Needed when the value type has no
    /// `PartialEq`. An already registered experiment keeps its matcher.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SignatureMismatch`] if `name` is registered with
    /// different argument, value or error types.
    pub fn experiment_with_matcher<A, T, E, M>(
        &self,
        name: &str,
        matcher: M,
    ) -> Result<Arc<Experiment<A, T, E>>>
    where
        A: Send + Sync + 'static,
        T: Send + 'static,
        E: Send + 'static,
        M: Matcher<T, E> + 'static,
    {
        if let Some(existing) = self.read_registry().get(name) {
            return downcast(name, existing);
        }

        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have won the race between the two locks.
        if let Some(existing) = registry.get(name) {
            return downcast(name, existing);
        }

        let settings = self.config.settings_for(name);
        let experiment =
            Experiment::with_matcher(name, matcher).with_journals(self.journals.clone());
        experiment.set_chance(settings.chance()?).mode(settings.mode);

        let experiment = Arc::new(experiment);
        let erased: Registered = Arc::clone(&experiment) as Registered;
        registry.insert(name.to_string(), erased);
        debug!(
            "Registered experiment '{}' ({}% sampled, {} mode)",
            name,
            if settings.enabled { settings.percentage } else { 0 },
            settings.mode
        );
        Ok(experiment)
    }

    /// Returns true if an experiment is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.read_registry().contains_key(name)
    }

    /// Returns the registered experiment names, sorted.
    pub fn experiment_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_registry().keys().cloned().collect();
        names.sort();
        names
    }

    /// Conducts `experiment` and returns the control's own result.
    ///
    /// Reports are published to this laboratory's journals.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingControl`] when no control is registered.
    pub fn run_experiment<A, T, E>(
        &self,
        experiment: &Experiment<A, T, E>,
        args: &A,
    ) -> Result<std::result::Result<T, E>>
    where
        A: Send + Sync + 'static,
        T: fmt::Debug + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        run(experiment, args, &self.journals)
    }

    /// Conducts `experiment` and returns the full report.
    ///
    /// Reports are published to this laboratory's journals.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingControl`] when no control is registered.
    pub fn get_report<A, T, E>(
        &self,
        experiment: &Experiment<A, T, E>,
        args: &A,
    ) -> Result<Report<T, E>>
    where
        A: Send + Sync + 'static,
        T: fmt::Debug + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        conduct(experiment, args, &self.journals, ControlGuard::Capture)
    }

    fn read_registry(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Registered>> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Laboratory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Laboratory")
            .field("config", &self.config)
            .field("experiments", &self.experiment_names())
            .field("journals", &self.journals)
            .finish()
    }
}

fn downcast<A, T, E>(name: &str, registered: &Registered) -> Result<Arc<Experiment<A, T, E>>>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    Arc::clone(registered)
        .downcast::<Experiment<A, T, E>>()
        .map_err(|_| Error::SignatureMismatch {
            name: name.to_string(),
        })
}

/// Conducts the experiment and extracts the control's result.
pub(crate) fn run<A, T, E>(
    experiment: &Experiment<A, T, E>,
    args: &A,
    journals: &Journals,
) -> Result<std::result::Result<T, E>>
where
    A: Send + Sync + 'static,
    T: fmt::Debug + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let report = conduct(experiment, args, journals, ControlGuard::Unwind)?;
    match report.into_control_outcome() {
        Ok(value) => Ok(Ok(value)),
        Err(Failure::Raised(e)) => Ok(Err(e)),
        // The control is not guarded on this path; re-raise just in case.
        Err(Failure::Panicked(message)) => panic::resume_unwind(Box::new(message)),
    }
}

/// Runs the protocol described in the module docs.
pub(crate) fn conduct<A, T, E>(
    experiment: &Experiment<A, T, E>,
    args: &A,
    journals: &Journals,
    guard: ControlGuard,
) -> Result<Report<T, E>>
where
    A: Send + Sync + 'static,
    T: fmt::Debug + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let name = experiment.name();
    let setup = experiment.snapshot();
    let control = setup
        .control
        .ok_or_else(|| Error::missing_control(name))?;

    let (sampled, control, trials) = match setup.mode {
        ExecutionMode::Sequential => {
            let control = observe_control(name, &control, args, guard);
            let sampled = setup.chance.should_run();
            let trials = if sampled {
                setup.trials.values().map(|trial| observe_trial(trial, args)).collect()
            } else {
                Vec::new()
            };
            (sampled, control, trials)
        }
        ExecutionMode::Parallel => {
            let sampled = setup.chance.should_run();
            let trials: Vec<&Trial<A, T, E>> = if sampled {
                setup.trials.values().collect()
            } else {
                Vec::new()
            };
            let (control, trials) = thread::scope(|scope| {
                let handles: Vec<_> = trials
                    .into_iter()
                    .map(|trial| (trial.name(), scope.spawn(move || observe_trial(trial, args))))
                    .collect();
                let control = observe_control(name, &control, args, guard);
                let trials = handles
                    .into_iter()
                    .map(|(trial_name, handle)| {
                        handle.join().unwrap_or_else(|_| {
                            Observation::new(
                                trial_name,
                                Err(Failure::Panicked("trial thread panicked".to_string())),
                                Utc::now(),
                                Duration::ZERO,
                            )
                        })
                    })
                    .collect::<Vec<_>>();
                (control, trials)
            });
            (sampled, control, trials)
        }
    };

    let report = Report::new(name, sampled, control, trials, setup.matcher.as_ref());
    debug!(
        "Conducted experiment '{}': sampled={}, trials={}, mismatches={}",
        name,
        report.sampled(),
        report.trials().len(),
        report.mismatches().len()
    );

    if !journals.is_empty() {
        // Rendering runs user Debug/Display impls on trial values.
        match panic::catch_unwind(AssertUnwindSafe(|| report.digest())) {
            Ok(digest) => {
                journals.publish(&digest);
            }
            Err(payload) => warn!(
                "Experiment '{}': could not render report: {}",
                name,
                panic_message(payload.as_ref())
            ),
        }
    }

    Ok(report)
}

fn observe_control<A, T, E>(
    name: &str,
    control: &Behavior<A, T, E>,
    args: &A,
    guard: ControlGuard,
) -> Observation<T, E> {
    match guard {
        ControlGuard::Unwind => Observation::capture_unguarded(name, || control.invoke(args)),
        ControlGuard::Capture => Observation::capture(name, || control.invoke(args)),
    }
}

fn observe_trial<A, T, E>(trial: &Trial<A, T, E>, args: &A) -> Observation<T, E> {
    Observation::capture(trial.name(), || trial.invoke(args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chance::{NeverRun, Probability};
    use crate::config::ExperimentConfig;
    use crate::journal::{FailingJournal, MemoryJournal};
    use proptest::prelude::*;

    type Sum = Experiment<(i64, i64), i64, String>;

    #[test]
    fn experiment_is_get_or_create() {
        let lab = Laboratory::new();
        let first = lab.experiment::<(i64, i64), i64, String>("x").unwrap();
        let second = lab.experiment::<(i64, i64), i64, String>("x").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        second.control(|(a, b)| Ok(a + b));
        assert!(first.has_control());
        assert_eq!(first.run(&(2, 2)).unwrap(), Ok(4));
        assert_eq!(lab.experiment_names(), vec!["x".to_string()]);
        assert!(lab.contains("x"));
        assert!(!lab.contains("y"));
    }

    #[derive(Debug)]
    struct Total(i64);

    #[test]
    fn registry_holds_values_without_equality() {
        let lab = Laboratory::new();
        let same_total = |c: &Observation<Total, String>, t: &Observation<Total, String>| {
            matches!((c.value(), t.value()), (Some(x), Some(y)) if x.0 == y.0)
        };
        let experiment = lab
            .experiment_with_matcher::<(i64, i64), Total, String, _>("totals", same_total)
            .unwrap();
        experiment
            .control(|(a, b)| Ok(Total(a + b)))
            .trial("same", |(a, b)| Ok(Total(b + a)))
            .trial("off", |(a, b)| Ok(Total(a + b + 1)));

        let again = lab.experiment_with_matcher("totals", same_total).unwrap();
        assert!(Arc::ptr_eq(&experiment, &again));

        let report = experiment.report(&(2, 3)).unwrap();
        assert!(report.is_match("same"));
        assert!(report.mismatches().contains("off"));
        assert_eq!(experiment.run(&(2, 3)).unwrap().unwrap().0, 5);
    }

    #[test]
    fn signature_mismatch_is_rejected() {
        let lab = Laboratory::new();
        lab.experiment::<(i64, i64), i64, String>("x").unwrap();
        assert!(matches!(
            lab.experiment::<String, String, String>("x"),
            Err(Error::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn concurrent_get_or_create_yields_one_instance() {
        let lab = Laboratory::new();
        let handles: Vec<Arc<Sum>> = thread::scope(|scope| {
            let spawned: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| lab.experiment::<(i64, i64), i64, String>("shared").unwrap())
                })
                .collect();
            spawned.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn reports_are_published_to_journals() {
        let memory = Arc::new(MemoryJournal::new());
        let lab = Laboratory::new();
        lab.add_journal(memory.clone());

        let experiment = lab.experiment::<(i64, i64), i64, String>("add").unwrap();
        experiment
            .control(|(a, b)| Ok(a + b))
            .trial("buggy", |(a, b)| Ok(a - b));

        experiment.run(&(2, 3)).unwrap().unwrap();
        experiment.report(&(2, 3)).unwrap();

        let entries = memory.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].mismatches, vec!["buggy".to_string()]);
    }

    #[test]
    fn journal_failure_does_not_affect_result() {
        let lab = Laboratory::new().with_journal(FailingJournal);
        let experiment = lab.experiment::<(i64, i64), i64, String>("add").unwrap();
        experiment.control(|(a, b)| Ok(a + b)).trial("t", |(a, b)| Ok(a + b));
        assert_eq!(experiment.run(&(2, 3)).unwrap(), Ok(5));
    }

    struct PanickingJournal;

    impl Journal for PanickingJournal {
        fn record(&self, _digest: &crate::report::ReportDigest) -> Result<()> {
            panic!("journal sink exploded")
        }
    }

    #[test]
    fn panicking_journal_does_not_affect_result() {
        let memory = Arc::new(MemoryJournal::new());
        let lab = Laboratory::new().with_journal(PanickingJournal);
        lab.add_journal(memory.clone());
        let experiment = lab.experiment::<(i64, i64), i64, String>("add").unwrap();
        experiment.control(|(a, b)| Ok(a + b)).trial("t", |(a, b)| Ok(a + b));

        assert_eq!(experiment.run(&(2, 3)).unwrap(), Ok(5));
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn lab_runs_directly_built_experiments() {
        let memory = Arc::new(MemoryJournal::new());
        let lab = Laboratory::new();
        lab.add_journal(memory.clone());

        let experiment = Sum::new("direct");
        experiment.control(|(a, b)| Ok(a * b)).trial("t", |(a, b)| Ok(a * b));

        assert_eq!(lab.run_experiment(&experiment, &(3, 4)).unwrap(), Ok(12));
        let report = lab.get_report(&experiment, &(3, 4)).unwrap();
        assert!(report.is_match("t"));
        assert_eq!(memory.len(), 2);

        // The experiment's own journals are empty.
        experiment.run(&(3, 4)).unwrap().unwrap();
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn config_assigns_chance_and_mode() {
        let config = LabConfig::new().with_experiment(
            "off",
            ExperimentConfig {
                enabled: Some(false),
                mode: Some(ExecutionMode::Parallel),
                ..ExperimentConfig::default()
            },
        );
        let lab = Laboratory::with_config(config).unwrap();
        let off = lab.experiment::<(i64, i64), i64, String>("off").unwrap();
        assert!(!off.should_run());
        assert_eq!(off.execution_mode(), ExecutionMode::Parallel);

        let on = lab.experiment::<(i64, i64), i64, String>("on").unwrap();
        assert!(on.should_run());
        assert_eq!(on.execution_mode(), ExecutionMode::Sequential);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = LabConfig::new().with_default_percentage(200);
        assert!(matches!(Laboratory::with_config(config), Err(Error::Config(_))));
    }

    #[test]
    fn sampling_gate_all_or_nothing() {
        let experiment = Sum::new("sampled");
        experiment
            .control(|(a, b)| Ok(a + b))
            .trial("one", |(a, b)| Ok(a + b))
            .trial("two", |(a, b)| Ok(b + a))
            .chance(Probability::percent(50).unwrap().seeded(3));

        for i in 0..200 {
            let report = experiment.report(&(i, 1)).unwrap();
            if report.sampled() {
                assert_eq!(report.trials().len(), 2);
            } else {
                assert!(report.trials().is_empty());
            }
            assert_eq!(report.control().value(), Some(&(i + 1)));
        }
    }

    #[test]
    fn never_run_in_parallel_mode_runs_only_control() {
        let experiment = Sum::new("quiet");
        experiment
            .control(|(a, b)| Ok(a + b))
            .trial("t", |_| panic!("must not run"))
            .chance(NeverRun)
            .mode(ExecutionMode::Parallel);
        let report = experiment.report(&(1, 2)).unwrap();
        assert!(report.trials().is_empty());
        assert_eq!(report.control().value(), Some(&3));
    }

    proptest! {
        #[test]
        fn run_is_transparent(
            a in -1_000_000i64..1_000_000,
            b in -1_000_000i64..1_000_000,
            fail in any::<bool>(),
        ) {
            let control = move |(x, y): &(i64, i64)| -> std::result::Result<i64, String> {
                if fail { Err(format!("refused {x},{y}")) } else { Ok(x + y) }
            };
            let experiment = Sum::new("transparent");
            experiment
                .control(control)
                .trial("raises", |_| Err("trial error".to_string()))
                .trial("panics", |_| panic!("trial panic"))
                .trial("drifts", |(x, y)| Ok(x + y + 1));

            prop_assert_eq!(experiment.run(&(a, b)).unwrap(), control(&(a, b)));

            let report = experiment.report(&(a, b)).unwrap();
            prop_assert_eq!(report.trials().len(), 3);
            for observation in report.trials().values().chain(std::iter::once(report.control())) {
                prop_assert!(observation.value().is_some() != observation.error().is_some());
            }
            prop_assert_eq!(report.mismatches().len(), 3);
        }
    }
}
