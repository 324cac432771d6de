//! Deterministic simulation harness.
//!
//! Provides a controlled environment for exercising experiments with
//! reproducible randomness and fault injection.

use crate::chaos::{ChaosConfig, ChaosInjector, TrialFault};
use crate::simulation::{Scenario, SimResult, Verdict};
use crate::subject::{
    addition, checked_add, checked_div, registered_addition, Arithmetic, MathError, Operands,
};
use assay_lab::{
    Error, ExecutionMode, Experiment, FailingJournal, Laboratory, MemoryJournal, OutcomeMatcher,
    Probability, Report,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use xxhash_rust::xxh64::xxh64;

/// Configuration for the simulation.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for all randomness.
    pub seed: u64,
    /// Number of iterations to run.
    pub iterations: usize,
    /// Whether to enable chaos injection.
    pub chaos_enabled: bool,
    /// Chaos configuration.
    pub chaos_config: ChaosConfig,
    /// Whether to verify determinism.
    pub verify_determinism: bool,
    /// Maximum duration for a single scenario.
    pub timeout: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            iterations: 100,
            chaos_enabled: false,
            chaos_config: ChaosConfig::default(),
            verify_determinism: true,
            timeout: Duration::from_secs(30),
        }
    }
}

impl SimConfig {
    /// Creates a new config with the given seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the number of iterations.
    #[must_use]
    pub const fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Enables chaos injection.
    #[must_use]
    pub fn with_chaos(mut self, config: ChaosConfig) -> Self {
        self.chaos_enabled = true;
        self.chaos_config = config;
        self
    }

    /// Disables determinism verification.
    #[must_use]
    pub const fn without_determinism_check(mut self) -> Self {
        self.verify_determinism = false;
        self
    }
}

/// Simulation harness for deterministic testing.
pub struct Simulation {
    config: SimConfig,
    rng: ChaCha8Rng,
    chaos: Option<ChaosInjector>,
}

impl Simulation {
    /// Creates a new simulation with the given configuration.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let chaos = if config.chaos_enabled {
            Some(ChaosInjector::new(
                config.chaos_config.clone().with_seed(config.seed),
            ))
        } else {
            None
        };

        Self { config, rng, chaos }
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs a scenario and returns the result.
    pub fn run_scenario(&mut self, scenario: &Scenario) -> SimResult {
        let start = Instant::now();

        let result = match scenario {
            Scenario::Transparency { trials, mode } => self.test_transparency(*trials, *mode),
            Scenario::ControlFailure => Self::test_control_failure(),
            Scenario::TrialIsolation => Self::test_trial_isolation(),
            Scenario::SamplingGate { percentage, runs } => {
                self.test_sampling_gate(*percentage, *runs)
            }
            Scenario::RegistryIdempotence { name, callers } => {
                Self::test_registry_idempotence(name, *callers)
            }
            Scenario::JournalContainment => Self::test_journal_containment(),
            Scenario::ChaosResilience { trials } => self.test_chaos_resilience(*trials),
        };

        let elapsed = start.elapsed();
        debug!("Scenario {} finished in {:?}", scenario.name(), elapsed);
        if elapsed > self.config.timeout && result.verdict == Verdict::Held {
            return SimResult::violated(
                scenario.name(),
                format!("Scenario took too long: {elapsed:?}"),
            )
            .with_runs(result.runs);
        }
        result
    }

    /// Runs all scenarios and returns their results.
    pub fn run_all(&mut self, scenarios: &[Scenario]) -> Vec<SimResult> {
        scenarios.iter().map(|s| self.run_scenario(s)).collect()
    }

    /// Draws a standard set of scenarios from the master seed.
    pub fn generate_scenarios(&mut self) -> Vec<Scenario> {
        let mode = if self.rng.gen_bool(0.5) {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        };
        let runs = self.config.iterations.max(200);

        vec![
            Scenario::transparency(self.rng.gen_range(1..=8), ExecutionMode::Sequential),
            Scenario::transparency(self.rng.gen_range(1..=8), mode),
            Scenario::ControlFailure,
            Scenario::TrialIsolation,
            Scenario::sampling_gate(0, runs),
            Scenario::sampling_gate(self.rng.gen_range(1..100), runs),
            Scenario::sampling_gate(100, runs),
            Scenario::registry_idempotence(
                format!("registry-{}", self.rng.gen::<u16>()),
                self.rng.gen_range(2..=8),
            ),
            Scenario::JournalContainment,
            Scenario::chaos_resilience(self.rng.gen_range(4..=16)),
        ]
    }

    fn operands(&mut self) -> Operands {
        (
            self.rng.gen_range(-1_000_000..=1_000_000),
            self.rng.gen_range(-1_000_000..=1_000_000),
        )
    }

    fn test_transparency(&mut self, trials: usize, mode: ExecutionMode) -> SimResult {
        const FAULTS: [TrialFault; 4] = [
            TrialFault::Raise,
            TrialFault::Panic,
            TrialFault::Drift(1),
            TrialFault::None,
        ];

        let experiment = addition("transparency");
        experiment.mode(mode);
        for (i, fault) in FAULTS.iter().cycle().take(trials).enumerate() {
            experiment.trial_behavior(format!("trial-{i}"), fault.behavior());
        }

        let mut diagnostics = Vec::new();
        for _ in 0..self.config.iterations {
            let operands = self.operands();
            match experiment.run(&operands) {
                Ok(result) if result == checked_add(&operands) => {}
                Ok(result) => diagnostics.push(format!("{operands:?} returned {result:?}")),
                Err(e) => diagnostics.push(format!("{operands:?} failed: {e}")),
            }
        }

        let result = if diagnostics.is_empty() {
            SimResult::held(
                "transparency",
                format!("{trials} trials ({mode}) returned the control result"),
            )
        } else {
            SimResult::violated("transparency", "Run diverged from the control")
                .with_diagnostics(diagnostics)
        };
        result.with_runs(self.config.iterations)
    }

    fn test_control_failure() -> SimResult {
        let experiment: Arithmetic = Experiment::with_matcher("control-failure", OutcomeMatcher);
        experiment
            .control(checked_div)
            .trial("zero", |_: &Operands| Ok(0))
            .trial("div", checked_div);

        match experiment.run(&(1, 0)) {
            Ok(Err(MathError::DivideByZero)) => {}
            other => {
                return SimResult::violated(
                    "control_failure",
                    format!("Expected the control error, got {other:?}"),
                )
                .with_runs(1);
            }
        }

        let report = match experiment.report(&(1, 0)) {
            Ok(report) => report,
            Err(e) => {
                return SimResult::violated("control_failure", format!("Report failed: {e}"))
                    .with_runs(1)
            }
        };
        let result = if report.trials().len() != 2 {
            SimResult::violated(
                "control_failure",
                format!("Expected 2 trials, found {}", report.trials().len()),
            )
        } else if report.is_match("div") && !report.is_match("zero") {
            SimResult::held("control_failure", "Control error returned, trials compared")
        } else {
            SimResult::violated("control_failure", "Trials misclassified")
                .with_diagnostic("expected only 'zero' to mismatch")
        };
        result
            .with_runs(2)
            .with_mismatches(report.mismatches().iter().cloned())
    }

    fn test_trial_isolation() -> SimResult {
        let experiment = addition("isolation");
        experiment
            .trial_behavior("a-raise", TrialFault::Raise.behavior())
            .trial_behavior("b-panic", TrialFault::Panic.behavior())
            .trial_behavior("c-healthy", TrialFault::None.behavior());

        let report = match experiment.report(&(2, 3)) {
            Ok(report) => report,
            Err(e) => {
                return SimResult::violated("trial_isolation", format!("Report failed: {e}"))
                    .with_runs(1)
            }
        };

        let mut diagnostics = Vec::new();
        if report.control().value() != Some(&5) {
            diagnostics.push("control did not return 5".to_string());
        }
        if !matches!(
            report.trial("a-raise").and_then(|o| o.error()).and_then(|f| f.raised()),
            Some(MathError::Injected(_))
        ) {
            diagnostics.push("a-raise did not record its error".to_string());
        }
        if !report
            .trial("b-panic")
            .and_then(|o| o.error())
            .is_some_and(assay_lab::Failure::is_panic)
        {
            diagnostics.push("b-panic did not record its panic".to_string());
        }
        let healthy = report.trial("c-healthy").and_then(|o| o.value());
        if healthy != Some(&5) || !report.is_match("c-healthy") {
            diagnostics.push("c-healthy was affected by its siblings".to_string());
        }

        let result = if diagnostics.is_empty() {
            SimResult::held("trial_isolation", "Faulty trials stayed contained")
        } else {
            SimResult::violated("trial_isolation", "Trial faults leaked")
                .with_diagnostics(diagnostics)
        };
        result
            .with_runs(1)
            .with_mismatches(report.mismatches().iter().cloned())
    }

    #[allow(clippy::cast_precision_loss)]
    fn test_sampling_gate(&mut self, percentage: u8, runs: usize) -> SimResult {
        let chance = match Probability::percent(percentage) {
            Ok(chance) => chance.seeded(self.rng.gen()),
            Err(e) => return SimResult::violated("sampling_gate", e.to_string()),
        };

        let experiment = addition("sampling");
        experiment
            .trial("first", checked_add)
            .trial("second", checked_add)
            .trial("third", checked_add)
            .chance(chance);

        let mut sampled = 0usize;
        for run in 0..runs {
            let operands = self.operands();
            let report = match experiment.report(&operands) {
                Ok(report) => report,
                Err(e) => {
                    return SimResult::violated("sampling_gate", format!("Report failed: {e}"))
                        .with_runs(run + 1)
                }
            };
            match (report.sampled(), report.trials().len()) {
                (true, 3) => sampled += 1,
                (false, 0) => {}
                (flag, count) => {
                    return SimResult::violated(
                        "sampling_gate",
                        format!("Partial run: sampled={flag} with {count} trials"),
                    )
                    .with_runs(run + 1)
                    .with_mismatches(report.mismatches().iter().cloned())
                }
            }
        }

        let p = f64::from(percentage) / 100.0;
        let expected = runs as f64 * p;
        let tolerance = 4.0 * (runs as f64 * p * (1.0 - p)).sqrt() + 1.0;
        let message = format!("{sampled}/{runs} runs sampled at {percentage}%");

        let result = if (sampled as f64 - expected).abs() <= tolerance {
            SimResult::held("sampling_gate", message)
        } else {
            SimResult::violated("sampling_gate", message)
                .with_diagnostic(format!("expected {expected:.0} +/- {tolerance:.0}"))
        };
        result.with_runs(runs)
    }

    fn test_registry_idempotence(name: &str, callers: usize) -> SimResult {
        let lab = Laboratory::new();
        let handles: Vec<_> = std::thread::scope(|scope| {
            let spawned: Vec<_> = (0..callers)
                .map(|_| scope.spawn(|| registered_addition(&lab, name)))
                .collect();
            spawned.into_iter().map(|h| h.join()).collect()
        });

        let mut experiments = Vec::with_capacity(callers);
        for handle in handles {
            match handle {
                Ok(Ok(experiment)) => experiments.push(experiment),
                Ok(Err(e)) => {
                    return SimResult::violated(
                        "registry_idempotence",
                        format!("Lookup failed: {e}"),
                    )
                }
                Err(_) => return SimResult::violated("registry_idempotence", "Caller panicked"),
            }
        }

        let Some(first) = experiments.first() else {
            return SimResult::skipped("registry_idempotence", "No callers");
        };
        if !experiments.iter().all(|e| Arc::ptr_eq(first, e)) {
            return SimResult::violated(
                "registry_idempotence",
                "Callers received different experiments",
            );
        }

        match lab.experiment::<Operands, String, MathError>(name) {
            Err(Error::SignatureMismatch { .. }) => SimResult::held(
                "registry_idempotence",
                format!("{callers} callers shared one experiment"),
            ),
            Err(e) => {
                SimResult::violated("registry_idempotence", format!("Unexpected error: {e}"))
            }
            Ok(_) => SimResult::violated("registry_idempotence", "Signature mismatch not detected"),
        }
    }

    fn test_journal_containment() -> SimResult {
        let memory = Arc::new(MemoryJournal::new());
        let lab = Laboratory::new().with_journal(FailingJournal);
        lab.add_journal(memory.clone());

        let experiment = match registered_addition(&lab, "journaled") {
            Ok(experiment) => experiment,
            Err(e) => return SimResult::violated("journal_containment", e.to_string()),
        };
        experiment.trial("buggy", crate::subject::checked_sub);

        let result = match experiment.run(&(2, 3)) {
            Ok(Ok(5)) if memory.len() == 1 => SimResult::held(
                "journal_containment",
                "Failing journal did not affect the control result",
            ),
            Ok(Ok(5)) => SimResult::violated(
                "journal_containment",
                format!("Expected 1 journaled report, found {}", memory.len()),
            ),
            other => {
                SimResult::violated("journal_containment", format!("Run returned {other:?}"))
            }
        };
        let journaled = memory.entries();
        let mismatches = journaled.iter().flat_map(|digest| digest.mismatches.iter().cloned());
        result.with_runs(1).with_mismatches(mismatches)
    }

    fn test_chaos_resilience(&mut self, trials: usize) -> SimResult {
        let Some(chaos) = &mut self.chaos else {
            return SimResult::skipped("chaos_resilience", "Chaos injection not enabled");
        };

        let mut diagnostics = Vec::new();
        let mut mismatches = Vec::new();
        for iteration in 0..self.config.iterations {
            let experiment = addition("chaos");
            let faults = chaos.infect(&experiment, trials);
            let operands = chaos.operands();

            match experiment.run(&operands) {
                Ok(result) if result == checked_add(&operands) => {}
                other => {
                    diagnostics.push(format!("iteration {iteration}: run returned {other:?}"));
                    continue;
                }
            }

            match experiment.report(&operands) {
                Ok(report) => {
                    diagnostics.extend(misclassified(&report, &faults));
                    mismatches.extend(report.mismatches().iter().cloned());
                }
                Err(e) => diagnostics.push(format!("iteration {iteration}: {e}")),
            }
        }

        let result = if diagnostics.is_empty() {
            SimResult::held(
                "chaos_resilience",
                format!(
                    "{} chaotic experiments with {trials} trials classified correctly",
                    self.config.iterations
                ),
            )
        } else {
            SimResult::violated("chaos_resilience", "Chaos broke an invariant")
                .with_diagnostics(diagnostics)
        };
        result
            .with_runs(self.config.iterations * 2)
            .with_mismatches(mismatches)
    }

    /// Verifies that two simulations with the same seed produce identical
    /// reports, timings aside.
    pub fn verify_determinism(&self) -> bool {
        if !self.config.verify_determinism {
            return true;
        }

        let chaos = self.config.chaos_config.clone().with_seed(self.config.seed);
        let iterations = self.config.iterations.min(50);
        let first = chaos_fingerprint(&chaos, iterations);
        let second = chaos_fingerprint(&chaos, iterations);
        debug!("Determinism fingerprints: {first:016x} / {second:016x}");

        first == second
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("config", &self.config)
            .field("chaos", &self.chaos)
            .finish_non_exhaustive()
    }
}

/// Trials whose mismatch status disagrees with their injected fault.
fn misclassified(report: &Report<i64, MathError>, faults: &[(String, TrialFault)]) -> Vec<String> {
    faults
        .iter()
        .filter(|(name, fault)| report.mismatches().contains(name) != fault.should_mismatch())
        .map(|(name, fault)| format!("{name} ({fault:?}) misclassified"))
        .collect()
}

/// Hashes the timing-free content of a chaotic run.
pub(crate) fn chaos_fingerprint(config: &ChaosConfig, iterations: usize) -> u64 {
    let mut injector = ChaosInjector::new(config.clone());
    let mut input = String::new();

    for _ in 0..iterations {
        let experiment = addition("fingerprint");
        injector.infect(&experiment, 4);
        let operands = injector.operands();
        let Ok(report) = experiment.report(&operands) else {
            input.push_str("error;");
            continue;
        };

        let digest = report.digest();
        for observation in std::iter::once(&digest.control).chain(&digest.trials) {
            input.push_str(&observation.name);
            input.push_str(&observation.status.to_string());
            input.push_str(&observation.detail);
            input.push_str(&format!("{:?};", observation.matched));
        }
    }

    xxh64(input.as_bytes(), 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimSummary;

    #[test]
    fn simulation_is_deterministic() {
        let config = SimConfig::default().with_seed(12345).with_iterations(20);
        let sim = Simulation::new(config);
        assert!(sim.verify_determinism());
    }

    #[test]
    fn generated_scenarios_pass() {
        let config = SimConfig::default()
            .with_seed(7)
            .with_iterations(20)
            .with_chaos(ChaosConfig::default());
        let mut sim = Simulation::new(config);

        let scenarios = sim.generate_scenarios();
        let summary = SimSummary::from_results(sim.run_all(&scenarios));
        assert!(summary.all_held(), "{summary}");
        assert_eq!(summary.count(Verdict::Skipped), 0);
        assert!(summary.total_runs() >= 20 * 2 + 200 * 3);
    }

    #[test]
    fn chaos_resilience_skips_without_chaos() {
        let mut sim = Simulation::new(SimConfig::default());
        let result = sim.run_scenario(&Scenario::chaos_resilience(4));
        assert_eq!(result.verdict, Verdict::Skipped);
        assert_eq!(result.runs, 0);
    }

    #[test]
    fn control_failure_passes() {
        let mut sim = Simulation::new(SimConfig::default());
        let result = sim.run_scenario(&Scenario::ControlFailure);
        assert_eq!(result.verdict, Verdict::Held, "Result: {result:?}");
        assert_eq!(result.runs, 2);
        assert_eq!(result.mismatches.iter().collect::<Vec<_>>(), ["zero"]);
    }

    #[test]
    fn parallel_transparency_passes() {
        let mut sim = Simulation::new(SimConfig::default().with_iterations(10));
        let result = sim.run_scenario(&Scenario::transparency(6, ExecutionMode::Parallel));
        assert_eq!(result.verdict, Verdict::Held, "Result: {result}");
        assert_eq!(result.runs, 10);
    }
}
