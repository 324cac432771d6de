//! Command implementations.

pub mod campaign;
pub mod check_config;
pub mod demo;
pub mod simulate;
