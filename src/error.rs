//! Error types for the comparison runner.
//!
//! Three kinds with different blast radii:
//!
//! - [`InvalidSpec`] is batch-fatal: raised eagerly from `Runner::run` before
//!   any fit is dispatched.
//! - [`SamplerError`] is per-spec: recorded as that spec's `FitFailed` outcome
//!   while the rest of the batch proceeds.
//! - [`ScoringError`] is per-spec: recorded as a `ScoringSkipped` reason.
//!
//! [`DataError`] belongs to the CSV/JSON I/O layer and never crosses the
//! `run` boundary.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Batch-level validation failure. Rejected before any fit starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidSpec {
    #[error("dataset is empty")]
    EmptyDataset,
    #[error("covariate '{name}' has {len} values, expected {expected}")]
    RaggedColumn {
        name: String,
        len: usize,
        expected: usize,
    },
    #[error("trials column has {len} values, expected {expected}")]
    RaggedTrials { len: usize, expected: usize },
    #[error("response at index {index} is not finite")]
    NonFiniteResponse { index: usize },
    #[error("covariate '{name}' at index {index} is not finite")]
    NonFiniteCovariate { name: String, index: usize },
    #[error("duplicate covariate column '{name}'")]
    DuplicateCovariate { name: String },
    #[error("no model specs supplied")]
    NoSpecs,
    #[error("model spec name must not be empty")]
    EmptyName,
    #[error("duplicate spec name '{name}'")]
    DuplicateName { name: String },
    #[error("formula '{formula}': {reason}")]
    MalformedFormula { formula: String, reason: String },
    #[error("spec '{spec}' references unknown covariate '{name}'")]
    UnknownCovariate { spec: String, name: String },
    #[error("spec '{spec}' uses a binomial likelihood but the dataset has no trial counts")]
    MissingTrials { spec: String },
    #[error("spec '{spec}': response {value} at index {index} is invalid for a {family} likelihood")]
    ResponseMismatch {
        spec: String,
        index: usize,
        value: f64,
        family: String,
    },
    #[error("spec '{spec}': {reason}")]
    InvalidFamily { spec: String, reason: String },
    #[error("spec '{spec}', parameter '{param}': {reason}")]
    InvalidPrior {
        spec: String,
        param: String,
        reason: String,
    },
    #[error("sampling config: {reason}")]
    InvalidConfig { reason: String },
}

/// Per-spec fitting failure. Never aborts the batch.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum SamplerError {
    #[error("no finite starting point found after {attempts} attempts")]
    InitFailed { attempts: usize },
    #[error("log-probability became non-finite at draw {draw} of chain {chain}")]
    NonFinite { chain: usize, draw: usize },
    #[error("fit exceeded its {limit:?} timeout")]
    Timeout { limit: Duration },
    #[error("sampler backend: {0}")]
    Backend(String),
}

/// Per-spec scoring failure. Downgrades `Scored` to `ScoringSkipped`.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum ScoringError {
    #[error("no log-likelihood matrix was produced for this fit")]
    MatrixMissing,
    #[error("log-likelihood matrix is empty")]
    EmptyMatrix,
    #[error("log-likelihood columns have unequal lengths")]
    RaggedColumns,
    #[error("log-likelihood matrix covers {found} observations, dataset has {expected}")]
    ObservationMismatch { expected: usize, found: usize },
    #[error("draws carry {found} parameters, the model expects {expected}")]
    ParamMismatch { expected: usize, found: usize },
    #[error("non-finite log-likelihood for observation {obs} at draw {draw}")]
    NonFinite { obs: usize, draw: usize },
    #[error("pointwise contributions have different lengths: {left} vs {right}")]
    PointwiseMismatch { left: usize, right: usize },
}

/// CSV ingest / JSON export failure (CLI-side only).
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV has no '{name}' column")]
    MissingColumn { name: String },
    #[error("line {line}, column '{column}': cannot parse '{value}' as a number")]
    BadCell {
        line: usize,
        column: String,
        value: String,
    },
    #[error("line {line}, column '{column}': trial count must be a non-negative integer, got '{value}'")]
    BadTrials {
        line: usize,
        column: String,
        value: String,
    },
    #[error("CSV contains no data rows")]
    Empty,
    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}
