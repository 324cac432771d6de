//! Simulation scenarios and results.

use assay_lab::ExecutionMode;
use std::collections::BTreeSet;
use std::fmt;

/// A test scenario to run in the simulation.
#[derive(Debug, Clone)]
pub enum Scenario {
    /// `run` returns the control result no matter what the trials do.
    Transparency {
        /// Number of faulty trials to register.
        trials: usize,
        /// How trials are scheduled.
        mode: ExecutionMode,
    },
    /// A failing control is returned as-is while trials keep running.
    ControlFailure,
    /// One trial raising or panicking does not affect its siblings.
    TrialIsolation,
    /// The sampling gate runs all trials or none, at the configured rate.
    SamplingGate {
        /// Sampling percentage.
        percentage: u8,
        /// Number of runs.
        runs: usize,
    },
    /// Get-or-create hands every caller the same experiment.
    RegistryIdempotence {
        /// Experiment name.
        name: String,
        /// Number of concurrent callers.
        callers: usize,
    },
    /// A failing journal never changes the control result.
    JournalContainment,
    /// Randomly faulty trials are classified correctly.
    ChaosResilience {
        /// Number of trials per experiment.
        trials: usize,
    },
}

impl Scenario {
    /// Creates a transparency scenario.
    #[must_use]
    pub const fn transparency(trials: usize, mode: ExecutionMode) -> Self {
        Self::Transparency { trials, mode }
    }

    /// Creates a sampling gate scenario.
    #[must_use]
    pub const fn sampling_gate(percentage: u8, runs: usize) -> Self {
        Self::SamplingGate { percentage, runs }
    }

    /// Creates a registry idempotence scenario.
    #[must_use]
    pub fn registry_idempotence(name: impl Into<String>, callers: usize) -> Self {
        Self::RegistryIdempotence {
            name: name.into(),
            callers,
        }
    }

    /// Creates a chaos resilience scenario.
    #[must_use]
    pub const fn chaos_resilience(trials: usize) -> Self {
        Self::ChaosResilience { trials }
    }

    /// Returns the name of this scenario.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Transparency { .. } => "transparency",
            Self::ControlFailure => "control_failure",
            Self::TrialIsolation => "trial_isolation",
            Self::SamplingGate { .. } => "sampling_gate",
            Self::RegistryIdempotence { .. } => "registry_idempotence",
            Self::JournalContainment => "journal_containment",
            Self::ChaosResilience { .. } => "chaos_resilience",
        }
    }
}

/// Whether a scenario's invariant held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every check of the scenario held.
    Held,
    /// At least one check failed.
    Violated,
    /// The scenario could not run under this configuration.
    Skipped,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Held => write!(f, "HELD"),
            Self::Violated => write!(f, "VIOLATED"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Outcome of one scenario: the verdict plus what the experiments saw.
#[derive(Debug, Clone)]
pub struct SimResult {
    /// Scenario name.
    pub scenario: String,
    /// Whether the invariant held.
    pub verdict: Verdict,
    /// One-line explanation.
    pub message: String,
    /// Number of `run`/`report` calls the scenario made.
    pub runs: usize,
    /// Trials flagged as mismatching by the reports the scenario inspected.
    pub mismatches: BTreeSet<String>,
    /// What went wrong, one entry per broken check.
    pub diagnostics: Vec<String>,
}

impl SimResult {
    fn with_verdict(scenario: &str, verdict: Verdict, message: String) -> Self {
        Self {
            scenario: scenario.to_string(),
            verdict,
            message,
            runs: 0,
            mismatches: BTreeSet::new(),
            diagnostics: Vec::new(),
        }
    }

    /// The scenario's invariant held.
    #[must_use]
    pub fn held(scenario: &str, message: impl Into<String>) -> Self {
        Self::with_verdict(scenario, Verdict::Held, message.into())
    }

    /// The scenario's invariant was violated.
    #[must_use]
    pub fn violated(scenario: &str, message: impl Into<String>) -> Self {
        Self::with_verdict(scenario, Verdict::Violated, message.into())
    }

    /// The scenario did not run.
    #[must_use]
    pub fn skipped(scenario: &str, reason: impl Into<String>) -> Self {
        Self::with_verdict(scenario, Verdict::Skipped, reason.into())
    }

    /// Records how many experiment calls were made.
    #[must_use]
    pub const fn with_runs(mut self, runs: usize) -> Self {
        self.runs = runs;
        self
    }

    /// Records mismatching trial names.
    #[must_use]
    pub fn with_mismatches<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mismatches.extend(names.into_iter().map(Into::into));
        self
    }

    /// Adds a diagnostic.
    #[must_use]
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostics.push(diagnostic.into());
        self
    }

    /// Adds several diagnostics.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: impl IntoIterator<Item = String>) -> Self {
        self.diagnostics.extend(diagnostics);
        self
    }

    /// Returns true unless the invariant was violated.
    pub const fn is_ok(&self) -> bool {
        !matches!(self.verdict, Verdict::Violated)
    }
}

impl fmt::Display for SimResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<22} {:<9} {:>6}  {}",
            self.scenario, self.verdict, self.runs, self.message
        )?;
        if !self.mismatches.is_empty() {
            let names: Vec<&str> = self.mismatches.iter().map(String::as_str).collect();
            write!(f, "\n    mismatched: {}", names.join(", "))?;
        }
        for diagnostic in &self.diagnostics {
            write!(f, "\n    ! {diagnostic}")?;
        }
        Ok(())
    }
}

/// Results of a batch of scenarios.
#[derive(Debug, Default)]
pub struct SimSummary {
    /// Results in execution order.
    pub results: Vec<SimResult>,
}

impl SimSummary {
    /// Wraps a batch of results.
    #[must_use]
    pub const fn from_results(results: Vec<SimResult>) -> Self {
        Self { results }
    }

    /// Number of results with the given verdict.
    pub fn count(&self, verdict: Verdict) -> usize {
        self.results.iter().filter(|r| r.verdict == verdict).count()
    }

    /// Results whose invariant was violated.
    pub fn violations(&self) -> impl Iterator<Item = &SimResult> {
        self.results.iter().filter(|r| !r.is_ok())
    }

    /// Total experiment calls across every scenario.
    pub fn total_runs(&self) -> usize {
        self.results.iter().map(|r| r.runs).sum()
    }

    /// Returns true if no invariant was violated.
    pub fn all_held(&self) -> bool {
        self.results.iter().all(SimResult::is_ok)
    }
}

impl fmt::Display for SimSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<22} {:<9} {:>6}  message", "scenario", "verdict", "runs")?;
        for result in &self.results {
            writeln!(f, "{result}")?;
        }
        write!(
            f,
            "{} held, {} violated, {} skipped over {} runs",
            self.count(Verdict::Held),
            self.count(Verdict::Violated),
            self.count(Verdict::Skipped),
            self.total_runs()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_lists_mismatches_and_diagnostics() {
        let result = SimResult::violated("control_failure", "Trials misclassified")
            .with_runs(2)
            .with_mismatches(["zero", "div"])
            .with_diagnostic("div should match");
        let rendered = result.to_string();
        assert!(rendered.starts_with("control_failure"));
        assert!(rendered.contains("VIOLATED"));
        assert!(rendered.contains("mismatched: div, zero"));
        assert!(rendered.contains("! div should match"));
        assert!(!result.is_ok());
    }

    #[test]
    fn skipped_is_not_a_violation() {
        let result = SimResult::skipped("chaos_resilience", "Chaos injection not enabled");
        assert!(result.is_ok());
        assert_eq!(result.runs, 0);
    }

    #[test]
    fn summary_counts_verdicts_and_runs() {
        let summary = SimSummary::from_results(vec![
            SimResult::held("transparency", "ok").with_runs(100),
            SimResult::violated("sampling_gate", "partial run").with_runs(7),
            SimResult::skipped("chaos_resilience", "off"),
        ]);
        assert_eq!(summary.count(Verdict::Held), 1);
        assert_eq!(summary.count(Verdict::Violated), 1);
        assert_eq!(summary.count(Verdict::Skipped), 1);
        assert_eq!(summary.total_runs(), 107);
        assert!(!summary.all_held());
        assert_eq!(summary.violations().count(), 1);
        assert!(summary
            .to_string()
            .ends_with("1 held, 1 violated, 1 skipped over 107 runs"));
    }

    #[test]
    fn scenario_names() {
        assert_eq!(Scenario::sampling_gate(25, 100).name(), "sampling_gate");
        assert_eq!(Scenario::registry_idempotence("x", 4).name(), "registry_idempotence");
        assert_eq!(
            Scenario::transparency(3, ExecutionMode::Parallel).name(),
            "transparency"
        );
    }
}
