//! Command-line parsing for the PSIS-LOO model comparison runner.
//!
//! The goal of this module is to keep **argument parsing** and **command
//! dispatch** separate from the modeling/scoring code: this module only
//! declares the surface, `app` interprets it.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "loocmp",
    version,
    about = "Bayesian model comparison via PSIS-LOO"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit every spec, score each with PSIS-LOO, and print the ranked
    /// comparison.
    Compare(RunArgs),
    /// Fit a single spec and print its parameter/diagnostic table.
    Fit(RunArgs),
}

/// Common options for comparing and fitting.
#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// CSV file with one row per observation.
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,

    /// Response column name.
    #[arg(long, default_value = "y")]
    pub response: String,

    /// Trial-count column name (binomial models only).
    #[arg(long, value_name = "COLUMN")]
    pub trials: Option<String>,

    /// Model spec as NAME:FAMILY:FORMULA, e.g. `slope:bernoulli:y ~ 1 + dose`.
    /// Repeat once per model.
    #[arg(long = "spec", value_name = "NAME:FAMILY:FORMULA")]
    pub specs: Vec<String>,

    /// Number of MCMC chains.
    #[arg(long, default_value_t = 4)]
    pub chains: usize,

    /// Post-warmup draws per chain.
    #[arg(long, default_value_t = 1000)]
    pub draws: usize,

    /// Warmup (adaptation) iterations per chain, discarded.
    #[arg(long, default_value_t = 1000)]
    pub warmup: usize,

    /// Base RNG seed. Omit to draw one from entropy.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Per-spec fit deadline in seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Cap on concurrently fitted specs (defaults to one per CPU).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Degrees of freedom for student-t likelihoods.
    #[arg(long, default_value_t = 7.0)]
    pub student_df: f64,

    /// Skip per-observation log-likelihood tracking (disables LOO scoring).
    #[arg(long)]
    pub no_log_lik: bool,

    /// Verbose logging (debug-level tracing on stderr).
    #[arg(short, long)]
    pub verbose: bool,

    /// Write the full report (entries, diagnostics, ranking) as JSON.
    #[arg(long, value_name = "PATH")]
    pub export_json: Option<PathBuf>,
}
