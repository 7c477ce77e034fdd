//! Model assembly: binding a `ModelSpec` to a `Dataset`.
//!
//! A built [`Model`] owns everything a sampler needs: the parameter layout
//! (names, constraining transforms, resolved priors), the design matrix, and
//! the response. Sampling happens on the unconstrained scale; transforms and
//! their log-Jacobians make the constrained-scale priors correct there.
//!
//! Parameterization by family:
//!
//! - Bernoulli/Binomial, intercept-only: one success probability `theta`
//!   on the natural scale, through a sigmoid transform.
//! - Bernoulli/Binomial with covariates: logit-link coefficients.
//! - Gaussian/Student-t: identity-link coefficients plus a residual scale
//!   `sigma` through a log transform.

pub mod design;
pub mod likelihood;
pub mod priors;

pub use design::{design_columns, design_matrix};

use nalgebra::DMatrix;
use rand::Rng;

use crate::domain::{Dataset, Family, ModelSpec, Prior};
use crate::error::InvalidSpec;
use crate::model::likelihood::{
    binomial_logit_lpmf, binomial_lpmf, normal_lpdf, sigmoid, softplus, student_t_lpdf,
};
use crate::model::priors::Role;

/// Map from a sampled raw coordinate to the constrained parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Unconstrained; raw is the parameter.
    Identity,
    /// `exp(raw)` for strictly positive parameters.
    Exp,
    /// `sigmoid(raw)` for parameters in (0, 1).
    Sigmoid,
}

impl Transform {
    pub fn apply(self, raw: f64) -> f64 {
        match self {
            Transform::Identity => raw,
            Transform::Exp => raw.exp(),
            Transform::Sigmoid => sigmoid(raw),
        }
    }

    /// Log absolute Jacobian of `apply` at `raw`.
    pub fn log_jacobian(self, raw: f64) -> f64 {
        match self {
            Transform::Identity => 0.0,
            Transform::Exp => raw,
            // ln s(r) + ln(1 - s(r)) without evaluating either endpoint.
            Transform::Sigmoid => -softplus(raw) - softplus(-raw),
        }
    }
}

/// One sampled parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub transform: Transform,
    pub prior: Prior,
}

/// A spec bound to a dataset, ready for posterior evaluation.
#[derive(Debug, Clone)]
pub struct Model {
    params: Vec<Param>,
    family: Family,
    /// True for the intercept-only binary parameterization.
    theta_scale: bool,
    /// n × p design matrix; zero columns on the theta parameterization.
    design: DMatrix<f64>,
    response: Vec<f64>,
    /// Per-observation trial counts; ones for Bernoulli, empty otherwise.
    trials: Vec<f64>,
}

impl Model {
    /// Bind a spec to a dataset, validating everything that can be checked
    /// without sampling. All failures are `InvalidSpec`.
    pub fn build(dataset: &Dataset, spec: &ModelSpec) -> Result<Self, InvalidSpec> {
        dataset.validate()?;
        let family = spec.family();
        if let Family::StudentT { df } = family {
            if !(df.is_finite() && df > 0.0) {
                return Err(InvalidSpec::InvalidFamily {
                    spec: spec.name().to_string(),
                    reason: format!("student-t degrees of freedom must be positive, got {df}"),
                });
            }
        }

        let n = dataset.len();
        let response = dataset.response().to_vec();

        let trials: Vec<f64> = match family {
            Family::Bernoulli => vec![1.0; n],
            Family::Binomial => {
                let t = dataset
                    .trials()
                    .ok_or_else(|| InvalidSpec::MissingTrials {
                        spec: spec.name().to_string(),
                    })?;
                t.iter().map(|&v| v as f64).collect()
            }
            Family::Gaussian | Family::StudentT { .. } => Vec::new(),
        };

        if family.is_binary() {
            for (i, &y) in response.iter().enumerate() {
                // Counts: non-negative integers, at most the trial count.
                if !(y >= 0.0 && y.fract() == 0.0 && y <= trials[i]) {
                    return Err(InvalidSpec::ResponseMismatch {
                        spec: spec.name().to_string(),
                        index: i,
                        value: y,
                        family: family.display_name(),
                    });
                }
            }
        }

        let theta_scale = family.is_binary() && spec.formula().is_intercept_only();

        let (design, mut params) = if theta_scale {
            let prior = resolve_prior(spec, "theta", Role::Theta);
            let params = vec![Param {
                name: "theta".to_string(),
                transform: Transform::Sigmoid,
                prior,
            }];
            (DMatrix::<f64>::zeros(n, 0), params)
        } else {
            let design = design_matrix(spec.formula(), dataset, spec.name())?;
            let params = design_columns(spec.formula())
                .into_iter()
                .map(|name| {
                    let role = if name == "intercept" {
                        Role::Intercept
                    } else {
                        Role::Slope
                    };
                    let prior = resolve_prior(spec, &name, role);
                    Param {
                        name,
                        transform: Transform::Identity,
                        prior,
                    }
                })
                .collect();
            (design, params)
        };

        if family.has_scale() {
            params.push(Param {
                name: "sigma".to_string(),
                transform: Transform::Exp,
                prior: resolve_prior(spec, "sigma", Role::Sigma),
            });
        }

        for param in &params {
            priors::validate(&param.prior, spec.name(), &param.name)?;
        }

        Ok(Self {
            params,
            family,
            theta_scale,
            design,
            response,
            trials,
        })
    }

    /// Number of sampled parameters.
    pub fn dim(&self) -> usize {
        self.params.len()
    }

    pub fn n_obs(&self) -> usize {
        self.response.len()
    }

    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    /// Map raw coordinates onto the constrained scale.
    pub fn constrain(&self, raw: &[f64], out: &mut [f64]) {
        for ((o, param), &r) in out.iter_mut().zip(&self.params).zip(raw) {
            *o = param.transform.apply(r);
        }
    }

    /// Unnormalized log-posterior on the unconstrained scale.
    ///
    /// `-inf` marks an excluded region (e.g. outside a uniform prior); the
    /// sampler treats it as an automatic rejection.
    pub fn log_posterior(&self, raw: &[f64]) -> f64 {
        let mut constrained = vec![0.0; raw.len()];
        self.constrain(raw, &mut constrained);

        let mut lp = 0.0;
        for ((param, &r), &v) in self.params.iter().zip(raw).zip(&constrained) {
            let prior_lp = priors::log_density(&param.prior, v);
            if prior_lp == f64::NEG_INFINITY {
                return f64::NEG_INFINITY;
            }
            lp += prior_lp + param.transform.log_jacobian(r);
        }
        for i in 0..self.n_obs() {
            lp += self.obs_log_lik(&constrained, i);
        }
        lp
    }

    /// Per-observation log-likelihood for one constrained-scale draw.
    pub fn log_lik_row(&self, constrained: &[f64]) -> Vec<f64> {
        (0..self.n_obs())
            .map(|i| self.obs_log_lik(constrained, i))
            .collect()
    }

    /// Random starting point on the unconstrained scale.
    pub fn init_raw<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let mut raw: Vec<f64> = (0..self.dim()).map(|_| rng.gen_range(-2.0..2.0)).collect();
        if let Some(idx) = self.sigma_index() {
            // Start the scale near the response spread instead of e^{±2}.
            let spread = crate::math::sample_sd(&self.response).max(1e-3);
            raw[idx] = spread.ln() + rng.gen_range(-1.0..1.0);
        }
        raw
    }

    fn sigma_index(&self) -> Option<usize> {
        self.family.has_scale().then(|| self.design.ncols())
    }

    fn eta(&self, coefs: &[f64], i: usize) -> f64 {
        self.design
            .row(i)
            .iter()
            .zip(coefs)
            .map(|(x, b)| x * b)
            .sum()
    }

    fn obs_log_lik(&self, constrained: &[f64], i: usize) -> f64 {
        let y = self.response[i];
        match self.family {
            Family::Bernoulli | Family::Binomial => {
                if self.theta_scale {
                    binomial_lpmf(y, self.trials[i], constrained[0])
                } else {
                    binomial_logit_lpmf(y, self.trials[i], self.eta(constrained, i))
                }
            }
            Family::Gaussian => {
                let p = self.design.ncols();
                normal_lpdf(y, self.eta(&constrained[..p], i), constrained[p])
            }
            Family::StudentT { df } => {
                let p = self.design.ncols();
                student_t_lpdf(y, self.eta(&constrained[..p], i), constrained[p], df)
            }
        }
    }
}

fn resolve_prior(spec: &ModelSpec, name: &str, role: Role) -> Prior {
    let chosen = spec.priors().terms.get(name).copied().unwrap_or(match role {
        Role::Theta | Role::Intercept => spec.priors().intercept,
        Role::Slope => spec.priors().slopes,
        Role::Sigma => spec.priors().sigma,
    });
    priors::resolve(chosen, role)
}
