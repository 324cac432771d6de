//! VOPR simulation campaigns.
//!
//! Long-running deterministic simulations over thousands of experiments:
//! - Chaos campaigns with randomly faulty trials
//! - Sampling campaigns checking the gate rate through a configured lab
//! - Concurrency campaigns hammering a shared laboratory
//! - Determinism campaigns comparing seeded fingerprints

#![allow(clippy::cast_possible_truncation)] // elapsed ms won't exceed u64
#![allow(clippy::cast_precision_loss)] // acceptable for rate calculations

use crate::chaos::{ChaosConfig, ChaosInjector};
use crate::harness::chaos_fingerprint;
use crate::subject::{addition, checked_add, registered_addition, Operands};
use assay_lab::{ExecutionMode, ExperimentConfig, LabConfig, Laboratory, MemoryJournal};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Results from a VOPR campaign.
#[derive(Debug)]
pub struct CampaignResult {
    /// Campaign name.
    pub name: String,
    /// Total iterations executed.
    pub iterations: usize,
    /// Experiment runs conducted.
    pub runs: u64,
    /// Real elapsed time.
    pub real_elapsed_ms: u64,
    /// Number of failures detected.
    pub failures: usize,
    /// Failure details.
    pub failure_details: Vec<String>,
    /// Whether all invariants held.
    pub all_passed: bool,
}

impl CampaignResult {
    /// Creates a passing result.
    #[must_use]
    pub fn pass(name: &str, iterations: usize, runs: u64, real_elapsed_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            iterations,
            runs,
            real_elapsed_ms,
            failures: 0,
            failure_details: Vec::new(),
            all_passed: true,
        }
    }

    /// Creates a failing result.
    #[must_use]
    pub fn fail(name: &str, iterations: usize, failures: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            iterations,
            runs: 0,
            real_elapsed_ms: 0,
            failures: failures.len(),
            failure_details: failures,
            all_passed: false,
        }
    }

    fn conclude(
        name: &str,
        iterations: usize,
        runs: u64,
        start: Instant,
        failures: Vec<String>,
    ) -> Self {
        let elapsed = start.elapsed().as_millis() as u64;
        if failures.is_empty() {
            Self::pass(name, iterations, runs, elapsed)
        } else {
            Self {
                runs,
                real_elapsed_ms: elapsed,
                ..Self::fail(name, iterations, failures)
            }
        }
    }
}

/// Runs a chaos campaign.
///
/// Every iteration builds a fresh experiment with up to eight randomly
/// faulty trials in a random execution mode, then checks that `run`
/// returns the control result and the report flags exactly the faulty
/// trials.
#[must_use]
pub fn run_chaos_campaign(seed: u64, iterations: usize) -> CampaignResult {
    let start = Instant::now();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut chaos = ChaosInjector::new(ChaosConfig::high_chaos().with_seed(seed));
    let mut failures = Vec::new();
    let mut runs = 0u64;

    for iteration in 0..iterations {
        let experiment = addition("chaos-campaign");
        if rng.gen_bool(0.5) {
            experiment.mode(ExecutionMode::Parallel);
        }
        let faults = chaos.infect(&experiment, rng.gen_range(1..=8));
        let operands = chaos.operands();

        runs += 2;
        match experiment.run(&operands) {
            Ok(result) if result == checked_add(&operands) => {}
            other => failures.push(format!("iteration {iteration}: run returned {other:?}")),
        }
        match experiment.report(&operands) {
            Ok(report) => {
                for (name, fault) in &faults {
                    if report.mismatches().contains(name) != fault.should_mismatch() {
                        failures.push(format!(
                            "iteration {iteration}: {name} ({fault:?}) misclassified"
                        ));
                    }
                }
            }
            Err(e) => failures.push(format!("iteration {iteration}: {e}")),
        }
    }

    info!("Chaos campaign: {} failures over {iterations} experiments", failures.len());
    CampaignResult::conclude("chaos_campaign", iterations, runs, start, failures)
}

/// Runs a sampling campaign through a configured laboratory.
///
/// One experiment samples at a random percentage, one is disabled and one
/// runs always. Journaled digests must be all-or-nothing and the sampled
/// share must stay within four standard deviations of the target.
#[must_use]
pub fn run_sampling_campaign(seed: u64, iterations: usize) -> CampaignResult {
    let start = Instant::now();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let percentage: u8 = rng.gen_range(5..=95);

    let config = LabConfig::new()
        .with_seed(seed)
        .with_default_percentage(percentage)
        .with_experiment(
            "disabled",
            ExperimentConfig {
                enabled: Some(false),
                ..ExperimentConfig::default()
            },
        )
        .with_experiment(
            "always",
            ExperimentConfig {
                percentage: Some(100),
                ..ExperimentConfig::default()
            },
        );

    let lab = match Laboratory::with_config(config) {
        Ok(lab) => lab,
        Err(e) => return CampaignResult::fail("sampling_campaign", iterations, vec![e.to_string()]),
    };
    let journal = Arc::new(MemoryJournal::new());
    lab.add_journal(journal.clone());

    let mut failures = Vec::new();
    for name in ["sampled", "disabled", "always"] {
        let experiment = match registered_addition(&lab, name) {
            Ok(experiment) => experiment,
            Err(e) => {
                return CampaignResult::fail("sampling_campaign", iterations, vec![e.to_string()])
            }
        };
        experiment.trial("first", checked_add).trial("second", checked_add);

        for _ in 0..iterations {
            let operands: Operands = (rng.gen_range(-1000..=1000), rng.gen_range(-1000..=1000));
            if let Err(e) = experiment.run(&operands) {
                failures.push(format!("{name}: {e}"));
            }
        }
    }

    let entries = journal.entries();
    for digest in &entries {
        let expected_trials = if digest.sampled { 2 } else { 0 };
        if digest.trials.len() != expected_trials {
            failures.push(format!(
                "{}: partial run with {} trials",
                digest.experiment,
                digest.trials.len()
            ));
        }
    }

    let sampled_count = |name: &str| {
        entries
            .iter()
            .filter(|d| d.experiment == name && d.sampled)
            .count()
    };
    if sampled_count("disabled") != 0 {
        failures.push("disabled experiment ran trials".to_string());
    }
    if sampled_count("always") != iterations {
        failures.push(format!(
            "always experiment sampled {} of {iterations}",
            sampled_count("always")
        ));
    }

    let p = f64::from(percentage) / 100.0;
    let expected = iterations as f64 * p;
    let tolerance = 4.0 * (iterations as f64 * p * (1.0 - p)).sqrt() + 1.0;
    let sampled = sampled_count("sampled");
    if (sampled as f64 - expected).abs() > tolerance {
        failures.push(format!(
            "sampled {sampled} of {iterations} at {percentage}%, \
             expected {expected:.0} +/- {tolerance:.0}"
        ));
    }

    info!("Sampling campaign: {sampled}/{iterations} sampled at {percentage}%");
    CampaignResult::conclude("sampling_campaign", iterations, entries.len() as u64, start, failures)
}

/// Runs a concurrency campaign on one shared laboratory.
///
/// Worker threads look experiments up by name, register trials and run
/// them all at once. Every run must return the control result and every
/// lookup of a name must yield the same instance.
#[must_use]
pub fn run_concurrency_campaign(seed: u64, iterations: usize) -> CampaignResult {
    const WORKERS: u64 = 8;
    const NAMES: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

    let start = Instant::now();
    let lab = Laboratory::new();
    let per_worker = iterations.div_ceil(WORKERS as usize);

    let outcomes: Vec<Vec<String>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|worker| {
                let lab = &lab;
                scope.spawn(move || {
                    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ worker);
                    let mut failures = Vec::new();
                    for i in 0..per_worker {
                        let name = NAMES[rng.gen_range(0..NAMES.len())];
                        let experiment = match registered_addition(lab, name) {
                            Ok(experiment) => experiment,
                            Err(e) => {
                                failures.push(format!("worker {worker}: {e}"));
                                continue;
                            }
                        };
                        experiment.trial(format!("worker-{worker}"), move |operands: &Operands| {
                            checked_add(operands).map(|sum| sum + i64::from(i % 2 == 0))
                        });
                        let operands = (rng.gen_range(-1000..=1000), rng.gen_range(-1000..=1000));
                        match experiment.run(&operands) {
                            Ok(result) if result == checked_add(&operands) => {}
                            other => {
                                failures.push(format!("worker {worker}: run returned {other:?}"));
                            }
                        }
                    }
                    failures
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|_| vec!["worker panicked".to_string()]))
            .collect()
    });

    let mut failures: Vec<String> = outcomes.into_iter().flatten().collect();
    let names = lab.experiment_names();
    if names.iter().any(|n| !NAMES.contains(&n.as_str())) {
        failures.push(format!("unexpected experiments registered: {names:?}"));
    }
    for name in &names {
        match (registered_addition(&lab, name), registered_addition(&lab, name)) {
            (Ok(a), Ok(b)) if Arc::ptr_eq(&a, &b) => {}
            _ => failures.push(format!("{name}: lookups returned different instances")),
        }
    }

    let runs = per_worker as u64 * WORKERS;
    info!("Concurrency campaign: {runs} runs across {WORKERS} workers");
    CampaignResult::conclude("concurrency_campaign", iterations, runs, start, failures)
}

/// Runs a determinism campaign.
///
/// Each iteration derives a seed, replays the same chaotic experiments
/// twice and compares timing-free fingerprints.
#[must_use]
pub fn run_determinism_campaign(seed: u64, iterations: usize) -> CampaignResult {
    const EXPERIMENTS_PER_ITERATION: usize = 5;

    let start = Instant::now();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut failures = Vec::new();

    for iteration in 0..iterations {
        let config = ChaosConfig::high_chaos().with_seed(rng.gen());
        let first = chaos_fingerprint(&config, EXPERIMENTS_PER_ITERATION);
        let second = chaos_fingerprint(&config, EXPERIMENTS_PER_ITERATION);
        if first != second {
            failures.push(format!(
                "iteration {iteration} (seed {}): {first:016x} != {second:016x}",
                config.seed
            ));
        }
    }

    let runs = (iterations * EXPERIMENTS_PER_ITERATION * 2) as u64;
    CampaignResult::conclude("determinism_campaign", iterations, runs, start, failures)
}

/// Runs every campaign with default sizes.
#[must_use]
pub fn run_all_campaigns(seed: u64) -> Vec<CampaignResult> {
    vec![
        run_chaos_campaign(seed, 1000),
        run_sampling_campaign(seed, 2000),
        run_concurrency_campaign(seed, 2000),
        run_determinism_campaign(seed, 200),
    ]
}
