//! CLI argument parsing for opstat

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for run results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text report (default)
    Text,
    /// JSON format for machine parsing
    Json,
    /// CSV format for spreadsheet analysis
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Text => "txt",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

/// Format of diagnostic log lines on stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "opstat")]
#[command(version)]
#[command(
    about = "Population statistics with jackknife confidence intervals and alerting for daily metric batches",
    long_about = None
)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// Format of log lines written to stderr
    #[arg(long = "log-format", value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute statistics and alerts for one date or build
    Run(RunArgs),

    /// Compute statistics and alerts for every date or build in a range
    Backfill(BackfillArgs),

    /// Parse and validate project configuration files
    ValidateConfig {
        /// Project TOML files
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },
}

/// Inputs shared by `run` and `backfill`
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Project configuration (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// Metric observations (JSON array)
    #[arg(short, long, value_name = "FILE")]
    pub observations: PathBuf,

    /// Previously computed statistic records (JSON array)
    #[arg(long, value_name = "FILE")]
    pub history: Option<PathBuf>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Date (YYYY-MM-DD) or build id to compute
    #[arg(short, long, value_name = "KEY")]
    pub date: String,

    /// Write the result here instead of stdout
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct BackfillArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// First date or build id (inclusive)
    #[arg(long = "start-date", value_name = "KEY")]
    pub start_date: String,

    /// Last date or build id (inclusive)
    #[arg(long = "end-date", value_name = "KEY")]
    pub end_date: String,

    /// Write one file per date or build into this directory instead of stdout
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}
