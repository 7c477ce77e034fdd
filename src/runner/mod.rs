//! Run orchestration: validate everything, fit every spec, score, collect.
//!
//! The runner is the crate's front door. One call to [`Runner::run`] takes a
//! dataset, a batch of model specs, and a sampling config, and produces a
//! [`RunReport`] with one entry per spec in input order.
//!
//! Failure handling is two-tier:
//!
//! - structural problems (bad dataset, bad config, bad spec) abort the whole
//!   run before any fitting starts;
//! - per-spec sampler failures — including panics and timeouts — are
//!   contained in that spec's entry, and the remaining specs still run.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::{
    Dataset, FitResult, LogLikMatrix, LooScore, ModelSpec, RunReport, SamplingConfig, SkipReason,
    SpecEntry, SpecOutcome,
};
use crate::error::{InvalidSpec, SamplerError, ScoringError};
use crate::fit::{Fitter, MetropolisFitter};
use crate::model::Model;

pub struct Runner {
    fitter: Arc<dyn Fitter>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(MetropolisFitter::new())
    }
}

impl Runner {
    pub fn new(fitter: impl Fitter + 'static) -> Self {
        Self {
            fitter: Arc::new(fitter),
        }
    }

    /// Fit and score every spec against one dataset.
    ///
    /// Every spec sees the same base seed, so two specs that describe the
    /// same model produce bit-identical draws within a run.
    pub fn run(
        &self,
        dataset: &Dataset,
        specs: &[ModelSpec],
        config: &SamplingConfig,
    ) -> Result<RunReport, InvalidSpec> {
        let models = validate_batch(dataset, specs, config)?;

        info!(
            specs = specs.len(),
            observations = dataset.len(),
            backend = self.fitter.name(),
            "starting comparison run"
        );

        let entries = match config.workers {
            Some(workers) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|e| InvalidSpec::InvalidConfig {
                        reason: e.to_string(),
                    })?;
                pool.install(|| self.run_all(specs, &models, config))
            }
            None => self.run_all(specs, &models, config),
        };

        let report = RunReport::new(entries);
        let flagged = report.total_flagged();
        if flagged > 0 {
            warn!(
                observations = flagged,
                threshold = crate::loo::PARETO_K_THRESHOLD,
                "Pareto k above threshold; affected elpd estimates are unreliable"
            );
        }
        Ok(report)
    }

    fn run_all(
        &self,
        specs: &[ModelSpec],
        models: &[Model],
        config: &SamplingConfig,
    ) -> Vec<SpecEntry> {
        specs
            .par_iter()
            .zip(models.par_iter())
            .map(|(spec, model)| self.run_one(spec, model, config))
            .collect()
    }

    fn run_one(&self, spec: &ModelSpec, model: &Model, config: &SamplingConfig) -> SpecEntry {
        let started = Instant::now();
        info!(spec = spec.name(), "fitting");

        let outcome = match self.fit_contained(spec, model, config) {
            Err(error) => {
                warn!(spec = spec.name(), error = %error, "fit failed");
                SpecOutcome::FitFailed { error }
            }
            Ok(fit) => score_fit(spec, model, fit),
        };

        let elapsed = started.elapsed();
        info!(
            spec = spec.name(),
            state = outcome.state_name(),
            elapsed_ms = elapsed.as_millis() as u64,
            "spec finished"
        );
        SpecEntry {
            name: spec.name().to_string(),
            outcome,
            elapsed,
        }
    }

    /// Run one fit without letting it take the process down.
    ///
    /// With a timeout the fit runs on a dedicated thread; if the deadline
    /// passes, the worker is abandoned to finish in the background and its
    /// result is dropped. Without one, the fit runs inline under
    /// `catch_unwind` so a panicking backend surfaces as a `SamplerError`.
    fn fit_contained(
        &self,
        spec: &ModelSpec,
        model: &Model,
        config: &SamplingConfig,
    ) -> Result<FitResult, SamplerError> {
        let Some(limit) = config.timeout else {
            return match panic::catch_unwind(AssertUnwindSafe(|| {
                self.fitter.fit(spec.name(), model, config)
            })) {
                Ok(result) => result,
                Err(payload) => Err(SamplerError::Backend(panic_message(payload.as_ref()))),
            };
        };

        let (tx, rx) = mpsc::sync_channel(1);
        let fitter = Arc::clone(&self.fitter);
        let spec_name = spec.name().to_string();
        let model = model.clone();
        let config = config.clone();
        let thread_name = format!("fit-{spec_name}");

        let spawned = thread::Builder::new().name(thread_name).spawn(move || {
            let result = fitter.fit(&spec_name, &model, &config);
            let _ = tx.send(result);
        });
        if spawned.is_err() {
            return Err(SamplerError::Backend(
                "could not spawn fit worker".to_string(),
            ));
        }

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(SamplerError::Timeout { limit }),
            // The worker dropped its channel without sending: it panicked.
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(SamplerError::Backend(
                "fit worker terminated without a result".to_string(),
            )),
        }
    }
}

/// All-or-nothing validation, returning the bound models so fitting and
/// scoring reuse them.
fn validate_batch(
    dataset: &Dataset,
    specs: &[ModelSpec],
    config: &SamplingConfig,
) -> Result<Vec<Model>, InvalidSpec> {
    dataset.validate()?;
    config.validate()?;
    if specs.is_empty() {
        return Err(InvalidSpec::NoSpecs);
    }
    let mut seen = BTreeSet::new();
    for spec in specs {
        if !seen.insert(spec.name()) {
            return Err(InvalidSpec::DuplicateName {
                name: spec.name().to_string(),
            });
        }
    }
    specs.iter().map(|spec| Model::build(dataset, spec)).collect()
}

fn score_fit(spec: &ModelSpec, model: &Model, fit: FitResult) -> SpecOutcome {
    if !spec.tracks_log_lik() {
        return SpecOutcome::ScoringSkipped {
            fit,
            reason: SkipReason::NotRequested,
        };
    }

    // Backends may supply the matrix directly; otherwise it is evaluated
    // from the stored draws.
    let matrix = match fit.log_lik() {
        Some(m) => Ok(m.clone()),
        None if fit.total_draws() == 0 => Err(ScoringError::MatrixMissing),
        None => log_lik_from_draws(model, &fit),
    };
    let scored = matrix.and_then(|m| {
        if m.n_obs() != model.n_obs() {
            return Err(ScoringError::ObservationMismatch {
                expected: model.n_obs(),
                found: m.n_obs(),
            });
        }
        let loo = LooScore::from_log_lik(&m)?;
        Ok((m, loo))
    });

    match scored {
        Ok((m, loo)) => SpecOutcome::Scored {
            fit: fit.with_log_lik(m),
            loo,
        },
        Err(e) => {
            warn!(spec = spec.name(), error = %e, "scoring failed");
            SpecOutcome::ScoringSkipped {
                fit,
                reason: SkipReason::Failed(e),
            }
        }
    }
}

fn log_lik_from_draws(model: &Model, fit: &FitResult) -> Result<LogLikMatrix, ScoringError> {
    let mut rows = Vec::with_capacity(fit.total_draws());
    for draw in fit.flat_draws() {
        if draw.len() != model.dim() {
            return Err(ScoringError::ParamMismatch {
                expected: model.dim(),
                found: draw.len(),
            });
        }
        rows.push(model.log_lik_row(draw));
    }
    LogLikMatrix::from_rows(&rows)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "fit worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Family, FitDiagnostics};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn dataset() -> Dataset {
        Dataset::new(vec![1.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0, 1.0, 0.0])
    }

    fn spec(name: &str) -> ModelSpec {
        ModelSpec::new(name, "1", Family::Bernoulli).unwrap()
    }

    fn empty_diag() -> FitDiagnostics {
        FitDiagnostics {
            divergences: 0,
            max_treedepth_hits: 0,
            params: Vec::new(),
        }
    }

    fn stub_fit(spec_name: &str, model: &Model, theta: f64) -> FitResult {
        let draw = vec![theta; model.dim()];
        let chains = vec![vec![draw.clone(); 10], vec![draw; 10]];
        FitResult::new(spec_name, model.param_names(), chains, empty_diag())
    }

    /// Canned draws, no sampling.
    struct StubFitter;

    impl Fitter for StubFitter {
        fn name(&self) -> &str {
            "stub"
        }

        fn fit(
            &self,
            spec_name: &str,
            model: &Model,
            _config: &SamplingConfig,
        ) -> Result<FitResult, SamplerError> {
            Ok(stub_fit(spec_name, model, 0.6))
        }
    }

    /// Fails, panics, or stalls on the spec named "bad".
    enum BadBehavior {
        Error,
        Panic,
        Stall,
    }

    struct SelectiveFitter(BadBehavior);

    impl Fitter for SelectiveFitter {
        fn name(&self) -> &str {
            "selective"
        }

        fn fit(
            &self,
            spec_name: &str,
            model: &Model,
            _config: &SamplingConfig,
        ) -> Result<FitResult, SamplerError> {
            if spec_name == "bad" {
                match self.0 {
                    BadBehavior::Error => {
                        return Err(SamplerError::Backend("boom".to_string()));
                    }
                    BadBehavior::Panic => panic!("exploded"),
                    BadBehavior::Stall => thread::sleep(Duration::from_secs(2)),
                }
            }
            Ok(stub_fit(spec_name, model, 0.6))
        }
    }

    struct CountingFitter(Arc<AtomicUsize>);

    impl Fitter for CountingFitter {
        fn name(&self) -> &str {
            "counting"
        }

        fn fit(
            &self,
            spec_name: &str,
            model: &Model,
            _config: &SamplingConfig,
        ) -> Result<FitResult, SamplerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(stub_fit(spec_name, model, 0.6))
        }
    }

    #[test]
    fn entries_keep_input_order_and_score() {
        let specs = vec![spec("zeta"), spec("alpha"), spec("mid")];
        let report = Runner::new(StubFitter)
            .run(&dataset(), &specs, &SamplingConfig::default())
            .unwrap();

        let names: Vec<&str> = report.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        for entry in report.entries() {
            let loo = entry.outcome.loo().expect("scored");
            assert!(loo.elpd.is_finite());
        }
    }

    #[test]
    fn validation_happens_before_any_fit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = Runner::new(CountingFitter(Arc::clone(&calls)));
        let config = SamplingConfig::default();

        let err = runner.run(&dataset(), &[], &config).unwrap_err();
        assert!(matches!(err, InvalidSpec::NoSpecs));

        let err = runner
            .run(&dataset(), &[spec("a"), spec("a")], &config)
            .unwrap_err();
        assert!(matches!(err, InvalidSpec::DuplicateName { .. }));

        let unknown = ModelSpec::new("u", "1 + nope", Family::Bernoulli).unwrap();
        let err = runner
            .run(&dataset(), &[spec("a"), unknown], &config)
            .unwrap_err();
        assert!(matches!(err, InvalidSpec::UnknownCovariate { .. }));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn fit_failures_do_not_abort_the_run() {
        let specs = vec![spec("ok1"), spec("bad"), spec("ok2")];
        let report = Runner::new(SelectiveFitter(BadBehavior::Error))
            .run(&dataset(), &specs, &SamplingConfig::default())
            .unwrap();

        assert_eq!(report.len(), 3);
        assert!(report.get("bad").unwrap().is_failed());
        assert!(report.get("ok1").unwrap().loo().is_some());
        assert!(report.get("ok2").unwrap().loo().is_some());
    }

    #[test]
    fn panics_are_contained() {
        let specs = vec![spec("ok"), spec("bad")];
        let report = Runner::new(SelectiveFitter(BadBehavior::Panic))
            .run(&dataset(), &specs, &SamplingConfig::default())
            .unwrap();

        match report.get("bad").unwrap() {
            SpecOutcome::FitFailed {
                error: SamplerError::Backend(msg),
            } => assert!(msg.contains("exploded"), "message: {msg}"),
            other => panic!("expected contained panic, got {other:?}"),
        }
        assert!(report.get("ok").unwrap().loo().is_some());
    }

    #[test]
    fn timeouts_and_worker_panics_with_deadline() {
        let config = SamplingConfig {
            timeout: Some(Duration::from_millis(100)),
            ..SamplingConfig::default()
        };

        let report = Runner::new(SelectiveFitter(BadBehavior::Stall))
            .run(&dataset(), &[spec("bad")], &config)
            .unwrap();
        assert!(matches!(
            report.get("bad").unwrap(),
            SpecOutcome::FitFailed {
                error: SamplerError::Timeout { .. }
            }
        ));

        let report = Runner::new(SelectiveFitter(BadBehavior::Panic))
            .run(&dataset(), &[spec("bad")], &config)
            .unwrap();
        assert!(matches!(
            report.get("bad").unwrap(),
            SpecOutcome::FitFailed {
                error: SamplerError::Backend(_)
            }
        ));
    }

    #[test]
    fn disabled_tracking_skips_scoring() {
        let specs = vec![spec("tracked"), spec("silent").without_log_lik()];
        let report = Runner::new(StubFitter)
            .run(&dataset(), &specs, &SamplingConfig::default())
            .unwrap();

        assert!(report.get("tracked").unwrap().loo().is_some());
        match report.get("silent").unwrap() {
            SpecOutcome::ScoringSkipped {
                reason: SkipReason::NotRequested,
                fit,
            } => assert_eq!(fit.spec_name(), "silent"),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn malformed_draws_surface_as_scoring_failures() {
        struct WideDraws;
        impl Fitter for WideDraws {
            fn name(&self) -> &str {
                "wide"
            }
            fn fit(
                &self,
                spec_name: &str,
                model: &Model,
                _config: &SamplingConfig,
            ) -> Result<FitResult, SamplerError> {
                let draw = vec![0.6; model.dim() + 1];
                let chains = vec![vec![draw; 5]];
                Ok(FitResult::new(
                    spec_name,
                    model.param_names(),
                    chains,
                    empty_diag(),
                ))
            }
        }

        let report = Runner::new(WideDraws)
            .run(&dataset(), &[spec("m")], &SamplingConfig::default())
            .unwrap();
        match report.get("m").unwrap() {
            SpecOutcome::ScoringSkipped {
                reason: SkipReason::Failed(ScoringError::ParamMismatch { expected: 1, found: 2 }),
                ..
            } => {}
            other => panic!("expected param mismatch, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_log_lik_surfaces_as_scoring_failure() {
        // theta = 0 makes observed successes impossible.
        struct ZeroTheta;
        impl Fitter for ZeroTheta {
            fn name(&self) -> &str {
                "zero"
            }
            fn fit(
                &self,
                spec_name: &str,
                model: &Model,
                _config: &SamplingConfig,
            ) -> Result<FitResult, SamplerError> {
                Ok(stub_fit(spec_name, model, 0.0))
            }
        }

        let report = Runner::new(ZeroTheta)
            .run(&dataset(), &[spec("m")], &SamplingConfig::default())
            .unwrap();
        match report.get("m").unwrap() {
            SpecOutcome::ScoringSkipped {
                reason: SkipReason::Failed(ScoringError::NonFinite { .. }),
                ..
            } => {}
            other => panic!("expected non-finite, got {other:?}"),
        }
    }

    #[test]
    fn backend_supplied_matrix_is_used_when_dimensions_agree() {
        struct MatrixFitter {
            n_obs: usize,
        }
        impl Fitter for MatrixFitter {
            fn name(&self) -> &str {
                "matrix"
            }
            fn fit(
                &self,
                spec_name: &str,
                model: &Model,
                _config: &SamplingConfig,
            ) -> Result<FitResult, SamplerError> {
                let matrix =
                    LogLikMatrix::from_columns(vec![vec![-1.0; 10]; self.n_obs]).unwrap();
                Ok(stub_fit(spec_name, model, 0.6).with_log_lik(matrix))
            }
        }

        // Matching dimensions: the supplied matrix wins over the draws.
        let report = Runner::new(MatrixFitter { n_obs: 10 })
            .run(&dataset(), &[spec("m")], &SamplingConfig::default())
            .unwrap();
        let loo = report.get("m").unwrap().loo().unwrap();
        assert_eq!(loo.elpd, -10.0);

        // Wrong observation count is a scoring failure, not a silent accept.
        let report = Runner::new(MatrixFitter { n_obs: 3 })
            .run(&dataset(), &[spec("m")], &SamplingConfig::default())
            .unwrap();
        match report.get("m").unwrap() {
            SpecOutcome::ScoringSkipped {
                reason:
                    SkipReason::Failed(ScoringError::ObservationMismatch {
                        expected: 10,
                        found: 3,
                    }),
                ..
            } => {}
            other => panic!("expected observation mismatch, got {other:?}"),
        }
    }

    #[test]
    fn drawless_fit_without_matrix_is_matrix_missing() {
        struct NoDraws;
        impl Fitter for NoDraws {
            fn name(&self) -> &str {
                "nodraws"
            }
            fn fit(
                &self,
                spec_name: &str,
                model: &Model,
                _config: &SamplingConfig,
            ) -> Result<FitResult, SamplerError> {
                Ok(FitResult::new(
                    spec_name,
                    model.param_names(),
                    Vec::new(),
                    empty_diag(),
                ))
            }
        }

        let report = Runner::new(NoDraws)
            .run(&dataset(), &[spec("m")], &SamplingConfig::default())
            .unwrap();
        match report.get("m").unwrap() {
            SpecOutcome::ScoringSkipped {
                reason: SkipReason::Failed(ScoringError::MatrixMissing),
                ..
            } => {}
            other => panic!("expected missing matrix, got {other:?}"),
        }
    }

    #[test]
    fn worker_pool_size_is_respected() {
        let config = SamplingConfig {
            workers: Some(2),
            ..SamplingConfig::default()
        };
        let specs = vec![spec("a"), spec("b"), spec("c"), spec("d")];
        let report = Runner::new(StubFitter).run(&dataset(), &specs, &config).unwrap();
        assert_eq!(report.len(), 4);
        assert!(report.entries().iter().all(|e| e.outcome.loo().is_some()));
    }
}
