//! Assay CLI - parallel experiments for safe refactoring.
//!
//! Commands:
//! - `assay demo` - Run the built-in arithmetic experiment
//! - `assay simulate` - Run the deterministic scenario harness
//! - `assay campaign` - Run long seeded campaigns
//! - `assay check-config` - Validate a laboratory configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "assay")]
#[command(about = "Run candidate code paths next to trusted ones and compare")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the arithmetic experiment through a configured laboratory
    Demo {
        /// Path to a laboratory config (YAML or JSON)
        #[arg(short, long, env = "ASSAY_CONFIG")]
        config: Option<String>,

        /// First operand
        #[arg(short, long, default_value_t = 2, allow_negative_numbers = true)]
        a: i64,

        /// Second operand
        #[arg(short, long, default_value_t = 3, allow_negative_numbers = true)]
        b: i64,

        /// Append report digests to this JSON lines file
        #[arg(short, long)]
        journal: Option<String>,
    },

    /// Run the deterministic simulation scenarios
    Simulate {
        /// Master seed
        #[arg(short, long, default_value_t = 42)]
        seed: u64,

        /// Iterations per scenario
        #[arg(short, long, default_value_t = 100)]
        iterations: usize,

        /// Enable chaos injection
        #[arg(long)]
        chaos: bool,
    },

    /// Run the chaos, sampling, concurrency and determinism campaigns
    Campaign {
        /// Master seed
        #[arg(short, long, default_value_t = 42)]
        seed: u64,

        /// Iterations per campaign
        #[arg(short, long, default_value_t = 1000)]
        iterations: usize,
    },

    /// Load and validate a laboratory configuration
    CheckConfig {
        /// Path to the config file
        path: String,

        /// Experiment names to resolve settings for
        #[arg(short, long)]
        experiment: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Commands::Demo {
            config,
            a,
            b,
            journal,
        } => commands::demo::run(config.as_deref(), (a, b), journal.as_deref()),
        Commands::Simulate {
            seed,
            iterations,
            chaos,
        } => commands::simulate::run(seed, iterations, chaos),
        Commands::Campaign { seed, iterations } => commands::campaign::run(seed, iterations),
        Commands::CheckConfig { path, experiment } => {
            commands::check_config::run(&path, &experiment)
        }
    }
}
