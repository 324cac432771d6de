//! Check-config command implementation.

use anyhow::{Context, Result};
use assay_lab::LabConfig;
use tracing::info;

/// Runs the check-config command.
///
/// Prints the effective settings of every configured experiment plus any
/// extra names given on the command line.
pub fn run(path: &str, extra: &[String]) -> Result<()> {
    let config = LabConfig::load(path).with_context(|| format!("Failed to load config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("Invalid config: {path}"))?;

    info!(
        "Config valid: enabled={}, default {}%, mode {}",
        config.enabled, config.default_percentage, config.mode
    );

    let mut names: Vec<&str> = config.experiments.keys().map(String::as_str).collect();
    names.extend(extra.iter().map(String::as_str));
    names.sort_unstable();
    names.dedup();

    for name in names {
        let settings = config.settings_for(name);
        let seed = settings
            .seed
            .map_or_else(|| "entropy".to_string(), |s| s.to_string());
        println!(
            "{name}: enabled={}, percentage={}%, mode={}, seed={seed}",
            settings.enabled, settings.percentage, settings.mode
        );
    }

    Ok(())
}
