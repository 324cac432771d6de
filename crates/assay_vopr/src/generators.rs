//! Property-based generators for synthetic experiments.
//!
//! Uses proptest strategies to generate:
//! - Operand pairs that never overflow the checked control
//! - Trial faults with a realistic mix of healthy and broken trials
//! - Whole experiment plans (trials plus sampling percentage)

use crate::chaos::TrialFault;
use crate::subject::{addition, Arithmetic, Operands};
use assay_lab::Probability;
use proptest::prelude::*;

/// Strategy for operand pairs safe for checked addition.
pub fn operands() -> impl Strategy<Value = Operands> {
    (-1_000_000_000i64..1_000_000_000, -1_000_000_000i64..1_000_000_000)
}

/// Strategy for trial faults.
pub fn trial_fault() -> impl Strategy<Value = TrialFault> {
    prop_oneof![
        5 => Just(TrialFault::None),
        2 => Just(TrialFault::Raise),
        1 => Just(TrialFault::Panic),
        2 => prop_oneof![-1000i64..=-1, 1i64..=1000].prop_map(TrialFault::Drift),
    ]
}

/// Strategy for experiment names.
///
/// # Panics
///
/// Panics if the internal regex is invalid (should never happen).
pub fn experiment_name() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{2,20}").expect("valid regex")
}

/// A generated experiment: named faulty trials and a sampling percentage.
#[derive(Debug, Clone)]
pub struct ExperimentPlan {
    /// Experiment name.
    pub name: String,
    /// Trial faults in trial-name order.
    pub trials: Vec<(String, TrialFault)>,
    /// Sampling percentage.
    pub percentage: u8,
    /// Seed for the sampling gate.
    pub seed: u64,
}

impl ExperimentPlan {
    /// Builds an addition experiment following this plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the percentage is above 100.
    pub fn build(&self) -> assay_lab::Result<Arithmetic> {
        let experiment = addition(&self.name);
        for (name, fault) in &self.trials {
            experiment.trial_behavior(name.clone(), fault.behavior());
        }
        experiment.chance(Probability::percent(self.percentage)?.seeded(self.seed));
        Ok(experiment)
    }

    /// Names of the trials that should mismatch a healthy control.
    pub fn expected_mismatches(&self) -> Vec<String> {
        self.trials
            .iter()
            .filter(|(_, fault)| fault.should_mismatch())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Strategy for experiment plans.
pub fn experiment_plan() -> impl Strategy<Value = ExperimentPlan> {
    (
        experiment_name(),
        prop::collection::vec(trial_fault(), 0..8),
        prop_oneof![3 => Just(100u8), 1 => 0u8..=100],
        any::<u64>(),
    )
        .prop_map(|(name, faults, percentage, seed)| ExperimentPlan {
            name,
            trials: faults
                .into_iter()
                .enumerate()
                .map(|(i, fault)| (format!("trial-{i}"), fault))
                .collect(),
            percentage,
            seed,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::checked_add;

    proptest! {
        #[test]
        fn run_returns_control_result(plan in experiment_plan(), operands in operands()) {
            let experiment = plan.build().unwrap();
            prop_assert_eq!(experiment.run(&operands).unwrap(), checked_add(&operands));
        }

        #[test]
        fn report_classifies_every_trial(plan in experiment_plan(), operands in operands()) {
            let experiment = plan.build().unwrap();
            let report = experiment.report(&operands).unwrap();

            prop_assert!(report.control().error().is_none());
            if report.sampled() {
                prop_assert_eq!(report.trials().len(), plan.trials.len());
                let mismatches: Vec<String> = report.mismatches().iter().cloned().collect();
                let mut expected = plan.expected_mismatches();
                expected.sort();
                prop_assert_eq!(mismatches, expected);
            } else {
                prop_assert!(report.trials().is_empty());
            }
        }

        #[test]
        fn observations_hold_exactly_one_outcome(
            plan in experiment_plan(),
            operands in operands(),
        ) {
            let experiment = plan.build().unwrap();
            let report = experiment.report(&operands).unwrap();
            for observation in report.trials().values().chain(std::iter::once(report.control())) {
                prop_assert!(observation.value().is_some() ^ observation.error().is_some());
            }
        }
    }
}
