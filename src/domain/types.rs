//! Shared domain types.
//!
//! Inputs (`Dataset`, `ModelSpec`, `SamplingConfig`) are built before a run
//! and read-only during it. Outputs (`FitResult`, `LooScore`, `RunReport`)
//! are produced per spec and never mutated afterward; re-fitting yields a new
//! `FitResult` instead of updating an old one, so earlier comparisons stay
//! reproducible.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::formula::Formula;
use crate::error::{InvalidSpec, SamplerError, ScoringError};

/// Likelihood family for a model spec.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Family {
    /// Binary outcomes in {0, 1}.
    Bernoulli,
    /// Aggregated success counts out of per-observation trials.
    Binomial,
    /// Continuous outcomes with Gaussian noise.
    Gaussian,
    /// Continuous outcomes with Student-t noise (fixed degrees of freedom).
    StudentT { df: f64 },
}

impl Family {
    /// Human-readable label for terminal output and error messages.
    pub fn display_name(self) -> String {
        match self {
            Family::Bernoulli => "bernoulli".to_string(),
            Family::Binomial => "binomial".to_string(),
            Family::Gaussian => "gaussian".to_string(),
            Family::StudentT { df } => format!("student-t({df})"),
        }
    }

    /// Families whose response is a success count over trials.
    pub fn is_binary(self) -> bool {
        matches!(self, Family::Bernoulli | Family::Binomial)
    }

    /// Families that carry a residual scale parameter.
    pub fn has_scale(self) -> bool {
        matches!(self, Family::Gaussian | Family::StudentT { .. })
    }
}

/// Prior distribution for a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Prior {
    /// Library default for the parameter's role: Uniform(0, 1) for a lone
    /// success probability, Normal(0, 2.5) for coefficients, flat for a
    /// residual scale.
    Default,
    /// Improper flat prior over the parameter's support.
    Flat,
    Normal { mu: f64, sigma: f64 },
    StudentT { df: f64, mu: f64, sigma: f64 },
    Uniform { lower: f64, upper: f64 },
}

/// Prior assignment for a whole model: one entry per parameter role, with
/// optional per-term overrides.
///
/// For the intercept-only binary parameterization the success probability
/// takes the `intercept` role; override it by name with a `"theta"` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorSpec {
    pub intercept: Prior,
    pub slopes: Prior,
    pub sigma: Prior,
    /// Parameter-name overrides; these win over the role-level entries.
    pub terms: BTreeMap<String, Prior>,
}

impl Default for PriorSpec {
    fn default() -> Self {
        Self {
            intercept: Prior::Default,
            slopes: Prior::Default,
            sigma: Prior::Default,
            terms: BTreeMap::new(),
        }
    }
}

impl PriorSpec {
    pub fn with_intercept(mut self, prior: Prior) -> Self {
        self.intercept = prior;
        self
    }

    pub fn with_slopes(mut self, prior: Prior) -> Self {
        self.slopes = prior;
        self
    }

    pub fn with_sigma(mut self, prior: Prior) -> Self {
        self.sigma = prior;
        self
    }

    pub fn with_term(mut self, name: impl Into<String>, prior: Prior) -> Self {
        self.terms.insert(name.into(), prior);
        self
    }
}

/// A named, immutable model configuration.
///
/// Construction parses and validates the formula eagerly; everything that
/// needs the dataset (covariate existence, response support, prior
/// hyperparameters) is validated by the runner before any fit is dispatched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSpec {
    name: String,
    formula: Formula,
    family: Family,
    priors: PriorSpec,
    track_log_lik: bool,
}

impl ModelSpec {
    pub fn new(
        name: impl Into<String>,
        formula: &str,
        family: Family,
    ) -> Result<Self, InvalidSpec> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(InvalidSpec::EmptyName);
        }
        Ok(Self {
            name,
            formula: Formula::parse(formula)?,
            family,
            priors: PriorSpec::default(),
            track_log_lik: true,
        })
    }

    pub fn with_priors(mut self, priors: PriorSpec) -> Self {
        self.priors = priors;
        self
    }

    /// Disable per-observation log-likelihood tracking (and thus LOO scoring).
    pub fn without_log_lik(mut self) -> Self {
        self.track_log_lik = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn priors(&self) -> &PriorSpec {
        &self.priors
    }

    pub fn tracks_log_lik(&self) -> bool {
        self.track_log_lik
    }
}

/// A fixed, column-oriented dataset shared read-only across fits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    response: Vec<f64>,
    covariates: Vec<(String, Vec<f64>)>,
    trials: Option<Vec<u64>>,
}

impl Dataset {
    pub fn new(response: Vec<f64>) -> Self {
        Self {
            response,
            covariates: Vec::new(),
            trials: None,
        }
    }

    pub fn with_covariate(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.covariates.push((name.into(), values));
        self
    }

    pub fn with_trials(mut self, trials: Vec<u64>) -> Self {
        self.trials = Some(trials);
        self
    }

    pub fn len(&self) -> usize {
        self.response.len()
    }

    pub fn is_empty(&self) -> bool {
        self.response.is_empty()
    }

    pub fn response(&self) -> &[f64] {
        &self.response
    }

    pub fn covariate(&self, name: &str) -> Option<&[f64]> {
        self.covariates
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn covariate_names(&self) -> impl Iterator<Item = &str> {
        self.covariates.iter().map(|(n, _)| n.as_str())
    }

    pub fn trials(&self) -> Option<&[u64]> {
        self.trials.as_deref()
    }

    /// Batch-level schema checks: non-empty, rectangular, finite.
    pub fn validate(&self) -> Result<(), InvalidSpec> {
        if self.response.is_empty() {
            return Err(InvalidSpec::EmptyDataset);
        }
        let n = self.response.len();
        for (i, v) in self.response.iter().enumerate() {
            if !v.is_finite() {
                return Err(InvalidSpec::NonFiniteResponse { index: i });
            }
        }
        let mut seen: Vec<&str> = Vec::with_capacity(self.covariates.len());
        for (name, values) in &self.covariates {
            if seen.contains(&name.as_str()) {
                return Err(InvalidSpec::DuplicateCovariate { name: name.clone() });
            }
            seen.push(name);
            if values.len() != n {
                return Err(InvalidSpec::RaggedColumn {
                    name: name.clone(),
                    len: values.len(),
                    expected: n,
                });
            }
            for (i, v) in values.iter().enumerate() {
                if !v.is_finite() {
                    return Err(InvalidSpec::NonFiniteCovariate {
                        name: name.clone(),
                        index: i,
                    });
                }
            }
        }
        if let Some(trials) = &self.trials {
            if trials.len() != n {
                return Err(InvalidSpec::RaggedTrials {
                    len: trials.len(),
                    expected: n,
                });
            }
        }
        Ok(())
    }
}

/// Sampler settings shared by every fit in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Chains per fit.
    pub chains: usize,
    /// Post-warmup draws per chain.
    pub draws: usize,
    /// Warmup (adaptation) iterations per chain.
    pub warmup: usize,
    /// Base RNG seed. `None` seeds each run from entropy; every spec in a run
    /// uses the same base seed, so identical specs produce identical draws.
    pub seed: Option<u64>,
    /// Abandon waiting for a fit after this long; the spec becomes `FitFailed`.
    pub timeout: Option<Duration>,
    /// Worker threads for dispatching spec fits. `None` means one per core.
    pub workers: Option<usize>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            chains: 4,
            draws: 1000,
            warmup: 1000,
            seed: None,
            timeout: None,
            workers: None,
        }
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<(), InvalidSpec> {
        let fail = |reason: &str| InvalidSpec::InvalidConfig {
            reason: reason.to_string(),
        };
        if self.chains == 0 {
            return Err(fail("chains must be at least 1"));
        }
        if self.draws == 0 {
            return Err(fail("draws must be at least 1"));
        }
        if self.warmup == 0 {
            return Err(fail("warmup must be at least 1"));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(fail("timeout must be non-zero"));
        }
        if self.workers == Some(0) {
            return Err(fail("workers must be at least 1"));
        }
        Ok(())
    }

    /// Post-warmup draws across all chains.
    pub fn total_draws(&self) -> usize {
        self.chains * self.draws
    }
}

/// Per-parameter posterior and convergence summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub mcse_mean: f64,
    pub ess_bulk: f64,
    pub ess_tail: f64,
    pub rhat: f64,
}

/// Sampler diagnostics for one fit.
///
/// Divergence and tree-depth counters exist for backends whose integrators
/// report them; the built-in random-walk backend always reports zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitDiagnostics {
    pub divergences: usize,
    pub max_treedepth_hits: usize,
    pub params: Vec<ParamSummary>,
}

impl FitDiagnostics {
    pub fn worst_rhat(&self) -> f64 {
        self.params
            .iter()
            .map(|p| p.rhat)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min_ess_bulk(&self) -> f64 {
        self.params
            .iter()
            .map(|p| p.ess_bulk)
            .fold(f64::INFINITY, f64::min)
    }
}

/// Per-observation log-likelihood values over posterior draws
/// (rows = draws, columns = observations).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLikMatrix {
    n_draws: usize,
    /// Column-major storage: `columns[i]` holds observation `i` across draws.
    columns: Vec<Vec<f64>>,
}

impl LogLikMatrix {
    /// Build from per-observation columns of equal length.
    pub fn from_columns(columns: Vec<Vec<f64>>) -> Result<Self, ScoringError> {
        let n_draws = columns.first().map_or(0, Vec::len);
        if columns.iter().any(|c| c.len() != n_draws) {
            return Err(ScoringError::RaggedColumns);
        }
        Ok(Self { n_draws, columns })
    }

    /// Build from per-draw rows (each row holds every observation).
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ScoringError> {
        let n_obs = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != n_obs) {
            return Err(ScoringError::RaggedColumns);
        }
        let mut columns = vec![Vec::with_capacity(rows.len()); n_obs];
        for row in rows {
            for (col, &v) in columns.iter_mut().zip(row.iter()) {
                col.push(v);
            }
        }
        Ok(Self {
            n_draws: rows.len(),
            columns,
        })
    }

    pub fn n_draws(&self) -> usize {
        self.n_draws
    }

    pub fn n_obs(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_draws == 0 || self.columns.is_empty()
    }

    pub fn column(&self, obs: usize) -> &[f64] {
        &self.columns[obs]
    }
}

/// Posterior draws plus diagnostics for one fitted spec.
///
/// Draws are on the constrained scale and ordered `chains[chain][draw]`,
/// each draw a parameter vector matching `param_names`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    spec_name: String,
    param_names: Vec<String>,
    chains: Vec<Vec<Vec<f64>>>,
    diagnostics: FitDiagnostics,
    log_lik: Option<LogLikMatrix>,
}

impl FitResult {
    pub fn new(
        spec_name: impl Into<String>,
        param_names: Vec<String>,
        chains: Vec<Vec<Vec<f64>>>,
        diagnostics: FitDiagnostics,
    ) -> Self {
        Self {
            spec_name: spec_name.into(),
            param_names,
            chains,
            diagnostics,
            log_lik: None,
        }
    }

    /// Attach a log-likelihood matrix, consuming self (results stay immutable
    /// once shared).
    pub fn with_log_lik(mut self, log_lik: LogLikMatrix) -> Self {
        self.log_lik = Some(log_lik);
        self
    }

    pub fn spec_name(&self) -> &str {
        &self.spec_name
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.param_names.iter().position(|n| n == name)
    }

    pub fn chains(&self) -> &[Vec<Vec<f64>>] {
        &self.chains
    }

    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    pub fn total_draws(&self) -> usize {
        self.chains.iter().map(Vec::len).sum()
    }

    /// All draws in chain order, flattened.
    pub fn flat_draws(&self) -> impl Iterator<Item = &[f64]> {
        self.chains
            .iter()
            .flat_map(|chain| chain.iter().map(Vec::as_slice))
    }

    /// Evaluate a derived quantity on every draw (e.g. an odds ratio).
    pub fn derived<F>(&self, f: F) -> Vec<f64>
    where
        F: Fn(&[f64]) -> f64,
    {
        self.flat_draws().map(f).collect()
    }

    pub fn posterior_mean(&self, name: &str) -> Option<f64> {
        let idx = self.param_index(name)?;
        let n = self.total_draws();
        if n == 0 {
            return None;
        }
        let sum: f64 = self.flat_draws().map(|d| d[idx]).sum();
        Some(sum / n as f64)
    }

    pub fn posterior_quantile(&self, name: &str, q: f64) -> Option<f64> {
        let idx = self.param_index(name)?;
        if self.total_draws() == 0 {
            return None;
        }
        let values: Vec<f64> = self.flat_draws().map(|d| d[idx]).collect();
        Some(crate::math::quantile(&values, q))
    }

    pub fn diagnostics(&self) -> &FitDiagnostics {
        &self.diagnostics
    }

    pub fn log_lik(&self) -> Option<&LogLikMatrix> {
        self.log_lik.as_ref()
    }
}

/// Estimated expected log predictive density via PSIS-LOO.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LooScore {
    /// Total elpd: the sum of the pointwise contributions.
    pub elpd: f64,
    /// Standard error: sd of the pointwise contributions × sqrt(n).
    pub se: f64,
    /// Effective number of parameters (lpd − elpd).
    pub p_loo: f64,
    /// Per-observation elpd contributions, in dataset order.
    pub pointwise: Vec<f64>,
    /// Fitted Pareto shape per observation; above 0.7 is unreliable.
    pub pareto_k: Vec<f64>,
    /// Count of observations whose shape exceeds the reliability threshold.
    pub flagged: usize,
}

impl LooScore {
    pub fn n_obs(&self) -> usize {
        self.pointwise.len()
    }
}

/// Why a fitted spec carries no LOO score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SkipReason {
    /// The spec did not request log-likelihood tracking.
    NotRequested,
    /// Scoring was attempted and failed.
    Failed(ScoringError),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotRequested => write!(f, "log-likelihood tracking disabled"),
            SkipReason::Failed(e) => write!(f, "{e}"),
        }
    }
}

/// Terminal state of one spec in a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SpecOutcome {
    /// The fit itself failed.
    FitFailed { error: SamplerError },
    /// Fit and LOO score both completed.
    Scored { fit: FitResult, loo: LooScore },
    /// Fit completed; no LOO score was produced.
    ScoringSkipped { fit: FitResult, reason: SkipReason },
}

impl SpecOutcome {
    pub fn fit(&self) -> Option<&FitResult> {
        match self {
            SpecOutcome::FitFailed { .. } => None,
            SpecOutcome::Scored { fit, .. } | SpecOutcome::ScoringSkipped { fit, .. } => Some(fit),
        }
    }

    pub fn loo(&self) -> Option<&LooScore> {
        match self {
            SpecOutcome::Scored { loo, .. } => Some(loo),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SpecOutcome::FitFailed { .. })
    }

    /// Short state label for logs and reports.
    pub fn state_name(&self) -> &'static str {
        match self {
            SpecOutcome::FitFailed { .. } => "fit-failed",
            SpecOutcome::Scored { .. } => "scored",
            SpecOutcome::ScoringSkipped { .. } => "scoring-skipped",
        }
    }
}

/// One spec's entry in a run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecEntry {
    pub name: String,
    pub outcome: SpecOutcome,
    pub elapsed: Duration,
}

/// The result of a whole run: one entry per requested spec, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    entries: Vec<SpecEntry>,
}

impl RunReport {
    pub(crate) fn new(entries: Vec<SpecEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[SpecEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&SpecOutcome> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.outcome)
    }

    /// Specs that reached the `Scored` state, in input order.
    pub fn scored(&self) -> impl Iterator<Item = (&str, &FitResult, &LooScore)> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            SpecOutcome::Scored { fit, loo } => Some((e.name.as_str(), fit, loo)),
            _ => None,
        })
    }

    /// Total Pareto-k flags across every scored spec.
    pub fn total_flagged(&self) -> usize {
        self.scored().map(|(_, _, loo)| loo.flagged).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_validate_catches_schema_errors() {
        assert_eq!(
            Dataset::new(vec![]).validate().unwrap_err(),
            InvalidSpec::EmptyDataset
        );

        let ragged = Dataset::new(vec![1.0, 2.0]).with_covariate("x", vec![1.0]);
        assert!(matches!(
            ragged.validate().unwrap_err(),
            InvalidSpec::RaggedColumn { .. }
        ));

        let nan = Dataset::new(vec![1.0, f64::NAN]);
        assert!(matches!(
            nan.validate().unwrap_err(),
            InvalidSpec::NonFiniteResponse { index: 1 }
        ));

        let dup = Dataset::new(vec![1.0])
            .with_covariate("x", vec![1.0])
            .with_covariate("x", vec![2.0]);
        assert!(matches!(
            dup.validate().unwrap_err(),
            InvalidSpec::DuplicateCovariate { .. }
        ));

        let ok = Dataset::new(vec![1.0, 0.0])
            .with_covariate("x", vec![0.5, -0.5])
            .with_trials(vec![1, 1]);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn model_spec_rejects_empty_name_and_bad_formula() {
        assert_eq!(
            ModelSpec::new("", "1", Family::Bernoulli).unwrap_err(),
            InvalidSpec::EmptyName
        );
        assert!(matches!(
            ModelSpec::new("m", "x +", Family::Gaussian).unwrap_err(),
            InvalidSpec::MalformedFormula { .. }
        ));
    }

    #[test]
    fn model_spec_defaults_track_log_lik() {
        let spec = ModelSpec::new("m", "1", Family::Bernoulli).unwrap();
        assert!(spec.tracks_log_lik());
        assert!(!spec.clone().without_log_lik().tracks_log_lik());
    }

    #[test]
    fn sampling_config_validate() {
        assert!(SamplingConfig::default().validate().is_ok());
        let mut config = SamplingConfig::default();
        config.chains = 0;
        assert!(config.validate().is_err());
        let mut config = SamplingConfig::default();
        config.timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn log_lik_matrix_round_trips_rows_and_columns() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let m = LogLikMatrix::from_rows(&rows).unwrap();
        assert_eq!(m.n_draws(), 3);
        assert_eq!(m.n_obs(), 2);
        assert_eq!(m.column(0), [1.0, 3.0, 5.0]);
        assert_eq!(m.column(1), [2.0, 4.0, 6.0]);

        assert!(LogLikMatrix::from_columns(vec![vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn fit_result_queries() {
        let chains = vec![
            vec![vec![1.0], vec![2.0]],
            vec![vec![3.0], vec![4.0]],
        ];
        let fit = FitResult::new(
            "m",
            vec!["theta".to_string()],
            chains,
            FitDiagnostics {
                divergences: 0,
                max_treedepth_hits: 0,
                params: vec![],
            },
        );
        assert_eq!(fit.total_draws(), 4);
        assert_eq!(fit.posterior_mean("theta"), Some(2.5));
        assert_eq!(fit.posterior_mean("missing"), None);
        let doubled = fit.derived(|d| 2.0 * d[0]);
        assert_eq!(doubled, vec![2.0, 4.0, 6.0, 8.0]);
    }
}
