//! Demo command implementation.

use anyhow::{Context, Result};
use assay_lab::{JsonLinesJournal, LabConfig, Laboratory, MemoryJournal, TracingJournal};
use assay_vopr::subject::{checked_add, checked_div, checked_sub, registered_addition};
use assay_vopr::Operands;
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing::{info, warn};

/// Name of the demo experiment.
const EXPERIMENT: &str = "arithmetic";

/// Runs the demo command.
pub fn run(
    config_path: Option<&str>,
    operands: Operands,
    journal_path: Option<&str>,
) -> Result<()> {
    let config = match config_path {
        Some(path) => {
            LabConfig::load(path).with_context(|| format!("Failed to load config: {path}"))?
        }
        None => LabConfig::default(),
    };

    let lab = Laboratory::with_config(config)
        .with_context(|| "Invalid laboratory configuration")?
        .with_journal(TracingJournal);

    let memory = Arc::new(MemoryJournal::new());
    lab.add_journal(memory.clone());

    if let Some(path) = journal_path {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open journal file: {path}"))?;
        lab.add_journal(Arc::new(JsonLinesJournal::new(file)));
        info!("Journaling reports to {}", path);
    }

    let experiment = registered_addition(&lab, EXPERIMENT)
        .with_context(|| format!("Failed to register experiment: {EXPERIMENT}"))?;
    experiment
        .trial("double-add", checked_add)
        .trial("buggy", checked_sub)
        .trial("checked-div", checked_div);

    info!(
        "Running '{}' ({} mode) with operands {:?}",
        EXPERIMENT,
        experiment.execution_mode(),
        operands
    );
    let result = experiment
        .run(&operands)
        .with_context(|| format!("Experiment '{EXPERIMENT}' could not run"))?;

    match &result {
        Ok(value) => println!("Result: {value}"),
        Err(e) => println!("Error: {e}"),
    }

    let Some(digest) = memory.entries().pop() else {
        warn!("No report was journaled");
        return Ok(());
    };
    if !digest.sampled {
        info!("Trials were not sampled for this run");
    }

    let json = serde_json::to_string_pretty(&digest).with_context(|| "Failed to render report")?;
    println!("{json}");

    Ok(())
}
