//! Campaign command implementation.

use anyhow::Result;
use assay_vopr::campaigns::{
    run_chaos_campaign, run_concurrency_campaign, run_determinism_campaign, run_sampling_campaign,
};
use tracing::{error, info};

/// Runs the campaign command.
pub fn run(seed: u64, iterations: usize) -> Result<()> {
    info!("Running campaigns with seed {} ({} iterations each)", seed, iterations);

    let results = vec![
        run_chaos_campaign(seed, iterations),
        run_sampling_campaign(seed, iterations),
        run_concurrency_campaign(seed, iterations),
        run_determinism_campaign(seed, (iterations / 5).max(1)),
    ];

    println!("=== VOPR Campaign Summary ===");
    for r in &results {
        let status = if r.all_passed { "PASS" } else { "FAIL" };
        println!(
            "[{}] {}: {} iterations, {} runs in {}ms",
            status, r.name, r.iterations, r.runs, r.real_elapsed_ms
        );
        for detail in &r.failure_details {
            error!("  {}: {}", r.name, detail);
        }
    }

    let failed = results.iter().filter(|r| !r.all_passed).count();
    if failed > 0 {
        anyhow::bail!("{failed} campaign(s) failed");
    }

    info!("All campaigns passed!");
    Ok(())
}
