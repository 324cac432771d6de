//! VOPR-style deterministic simulation testing for Assay.
//!
//! This crate provides:
//! - An arithmetic subject with known-correct controls
//! - Chaos injection of raising, panicking and drifting trials
//! - Property-based generators for whole experiment plans
//! - A deterministic simulation harness and long-running campaigns
//!
//! # VOPR Testing Philosophy
//!
//! VOPR (Vaguely Ordered Parallel Replayability) testing ensures:
//! 1. **Determinism**: Same seed produces identical reports
//! 2. **Transparency**: No trial fault ever reaches the caller
//! 3. **Fault injection**: Systematic chaos testing
//! 4. **Parallel safety**: Concurrent registry and run correctness
//!
//! # Example
//!
//! ```rust,ignore
//! use assay_vopr::{Scenario, SimConfig, Simulation};
//!
//! let mut sim = Simulation::new(SimConfig::default().with_seed(42));
//! let result = sim.run_scenario(&Scenario::TrialIsolation);
//! assert!(result.is_ok());
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod campaigns;
pub mod chaos;
pub mod generators;
pub mod harness;
pub mod simulation;
pub mod subject;

pub use campaigns::{run_all_campaigns, CampaignResult};
pub use chaos::{ChaosConfig, ChaosInjector, TrialFault};
pub use generators::ExperimentPlan;
pub use harness::{SimConfig, Simulation};
pub use simulation::{Scenario, SimResult, SimSummary, Verdict};
pub use subject::{Arithmetic, MathError, Operands};
