//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads the dataset CSV
//! - builds model specs from `--spec` strings
//! - runs the comparison
//! - prints reports
//! - writes the optional JSON export

use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::info;

use crate::cli::{Cli, Command, RunArgs};
use crate::domain::{Family, ModelSpec, SamplingConfig, SpecOutcome};
use crate::error::{DataError, InvalidSpec, SamplerError};
use crate::runner::Runner;

/// Binary-level error: everything the `loocmp` entry point can die with,
/// tagged with a Unix exit code.
///
/// `compare` runs always exit 0 once dispatch starts; per-spec failures live
/// inside the printed report. `fit` promotes its single spec's failure to a
/// process failure.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Spec(#[from] InvalidSpec),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("fit failed: {0}")]
    Fit(#[from] SamplerError),
}

impl AppError {
    /// Usage/config problems exit 2, data problems 3, fit failures 4.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Usage(_) | AppError::Spec(_) => 2,
            AppError::Data(_) => 3,
            AppError::Fit(_) => 4,
        }
    }
}

/// Entry point for the `loocmp` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Compare(args) => handle(args, OutputMode::Comparison),
        Command::Fit(args) => handle(args, OutputMode::FitDetail),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    /// Ranked comparison across every spec.
    Comparison,
    /// Per-parameter table for a single spec.
    FitDetail,
}

fn handle(args: RunArgs, mode: OutputMode) -> Result<(), AppError> {
    init_tracing(args.verbose);

    if args.specs.is_empty() {
        return Err(AppError::Usage(
            "no --spec given; expected at least one NAME:FAMILY:FORMULA".to_string(),
        ));
    }
    if mode == OutputMode::FitDetail && args.specs.len() != 1 {
        return Err(AppError::Usage(format!(
            "`fit` takes exactly one --spec, got {}",
            args.specs.len()
        )));
    }

    let (dataset, ingest) = crate::io::load_dataset(&args.data, &args.response, args.trials.as_deref())?;
    info!(
        rows = ingest.rows_read,
        covariates = ?ingest.covariates,
        "dataset loaded"
    );

    let mut specs = Vec::with_capacity(args.specs.len());
    for raw in &args.specs {
        let mut spec = parse_spec(raw, args.student_df)?;
        if args.no_log_lik {
            spec = spec.without_log_lik();
        }
        specs.push(spec);
    }

    let config = SamplingConfig {
        chains: args.chains,
        draws: args.draws,
        warmup: args.warmup,
        seed: args.seed,
        timeout: args.timeout_secs.map(Duration::from_secs),
        workers: args.workers,
    };

    let report = Runner::default().run(&dataset, &specs, &config)?;

    match mode {
        OutputMode::Comparison => println!("{}", crate::report::format_run_report(&report)),
        OutputMode::FitDetail => {
            for entry in report.entries() {
                match &entry.outcome {
                    SpecOutcome::FitFailed { error } => return Err(AppError::Fit(error.clone())),
                    SpecOutcome::Scored { fit, .. } | SpecOutcome::ScoringSkipped { fit, .. } => {
                        println!("{}", crate::report::format_fit_summary(fit));
                    }
                }
            }
        }
    }

    if let Some(path) = &args.export_json {
        crate::io::write_report_json(path, &report)?;
        info!(path = %path.display(), "report exported");
    }

    Ok(())
}

/// Stderr logging so stdout stays clean for the report itself.
/// `RUST_LOG` wins over `--verbose` when set.
fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "loo_compare=debug"
    } else {
        "loo_compare=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Parse one `NAME:FAMILY:FORMULA` argument. The formula may itself contain
/// colons; only the first two split.
fn parse_spec(raw: &str, student_df: f64) -> Result<ModelSpec, AppError> {
    let mut parts = raw.splitn(3, ':');
    let (Some(name), Some(family), Some(formula)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(AppError::Usage(format!(
            "--spec '{raw}' is not NAME:FAMILY:FORMULA"
        )));
    };
    let family = family.trim();
    let family = parse_family(family, student_df)
        .ok_or_else(|| AppError::Usage(format!("--spec '{raw}': unknown family '{family}'")))?;
    Ok(ModelSpec::new(name.trim(), formula.trim(), family)?)
}

fn parse_family(label: &str, student_df: f64) -> Option<Family> {
    match label.to_ascii_lowercase().as_str() {
        "bernoulli" => Some(Family::Bernoulli),
        "binomial" => Some(Family::Binomial),
        "gaussian" | "normal" => Some(Family::Gaussian),
        "student-t" | "student_t" => Some(Family::StudentT { df: student_df }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_family_formula() {
        let spec = parse_spec("m1:bernoulli:y ~ 1", 7.0).unwrap();
        assert_eq!(spec.name(), "m1");
        assert_eq!(spec.family(), Family::Bernoulli);
        assert!(spec.formula().is_intercept_only());
    }

    #[test]
    fn student_t_family_takes_the_cli_df() {
        let spec = parse_spec("robust:student-t:y ~ 1 + x", 5.0).unwrap();
        assert_eq!(spec.family(), Family::StudentT { df: 5.0 });
        assert_eq!(spec.formula().terms(), ["x"]);
    }

    #[test]
    fn malformed_spec_strings_are_usage_errors() {
        assert!(matches!(parse_spec("m1", 7.0), Err(AppError::Usage(_))));
        assert!(matches!(
            parse_spec("m1:bernoulli", 7.0),
            Err(AppError::Usage(_))
        ));
        assert!(matches!(
            parse_spec("m1:poisson:y ~ 1", 7.0),
            Err(AppError::Usage(_))
        ));
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(AppError::Usage("x".into()).exit_code(), 2);
        assert_eq!(AppError::Spec(InvalidSpec::NoSpecs).exit_code(), 2);
        assert_eq!(AppError::Data(DataError::Empty).exit_code(), 3);
        assert_eq!(
            AppError::Fit(SamplerError::Backend("boom".into())).exit_code(),
            4
        );
    }

    #[test]
    fn cli_defaults_are_sane() {
        let cli = Cli::parse_from([
            "loocmp",
            "compare",
            "--data",
            "d.csv",
            "--spec",
            "flat:bernoulli:y ~ 1",
        ]);
        let Command::Compare(args) = cli.command else {
            panic!("expected compare");
        };
        assert_eq!(args.chains, 4);
        assert_eq!(args.draws, 1000);
        assert_eq!(args.warmup, 1000);
        assert_eq!(args.response, "y");
        assert!(args.seed.is_none());
        assert!(!args.no_log_lik);
    }
}
