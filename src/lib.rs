//! opstat - population statistics and alerting for operational monitoring
//!
//! This library turns per-client metric observations (scalars and
//! histograms) into population-level statistics with jackknife confidence
//! intervals, and raises alerts when those statistics cross thresholds,
//! differ between branches, or drift from their own history.

pub mod alert;
pub mod cli;
pub mod config;
pub mod csv_output;
pub mod error;
pub mod estimate;
pub mod histogram;
pub mod json_output;
pub mod monitor;
pub mod records;
pub mod statistic;
pub mod text_output;

pub use error::{OpstatError, Result};
