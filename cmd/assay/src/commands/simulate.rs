//! Simulate command implementation.

use anyhow::Result;
use assay_vopr::{ChaosConfig, SimConfig, SimSummary, Simulation, Verdict};
use tracing::{error, info};

/// Runs the simulate command.
pub fn run(seed: u64, iterations: usize, chaos: bool) -> Result<()> {
    info!("Simulating with seed {} ({} iterations)", seed, iterations);

    let mut config = SimConfig::default()
        .with_seed(seed)
        .with_iterations(iterations);
    if chaos {
        config = config.with_chaos(ChaosConfig::default());
    }

    let mut sim = Simulation::new(config);
    let scenarios = sim.generate_scenarios();
    let summary = SimSummary::from_results(sim.run_all(&scenarios));
    println!("{summary}");

    if !sim.verify_determinism() {
        anyhow::bail!("Simulation with seed {seed} is not deterministic");
    }

    if !summary.all_held() {
        for result in summary.violations() {
            error!("{}", result);
        }
        anyhow::bail!("{} scenario(s) violated", summary.count(Verdict::Violated));
    }

    info!("All scenarios held over {} runs", summary.total_runs());
    Ok(())
}
