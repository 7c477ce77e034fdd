//! Pareto-smoothed importance sampling leave-one-out scoring.
//!
//! For each observation the importance ratios `1/p(y_i | draw)` estimate the
//! density of the leave-one-out posterior. Raw ratios can have infinite
//! variance, so the largest ones are replaced by quantiles of a generalized
//! Pareto distribution fitted to the weight tail (Vehtari, Gelman & Gabry
//! 2017). The fitted shape `k̂` doubles as a reliability diagnostic: above
//! [`PARETO_K_THRESHOLD`] the estimate for that observation cannot be
//! trusted, and the observation is counted in `flagged`.

use crate::domain::{LogLikMatrix, LooScore};
use crate::error::ScoringError;
use crate::math::{gpd_fit, gpd_quantile, log_sum_exp, sample_sd};

/// Observations whose Pareto shape exceeds this are unreliable.
pub const PARETO_K_THRESHOLD: f64 = 0.7;

/// Smallest tail the generalized Pareto fit will accept.
const MIN_TAIL: usize = 5;

/// Number of weights treated as the tail: `min(0.2 S, 3 √S)`, rounded up.
pub(crate) fn tail_length(n_draws: usize) -> usize {
    let s = n_draws as f64;
    (0.2 * s).min(3.0 * s.sqrt()).ceil() as usize
}

impl LooScore {
    /// Score one model from its pointwise log-likelihood matrix.
    ///
    /// Every cell must be finite. Observations whose weight tail is too
    /// short or degenerate to fit keep their raw weights and report
    /// `k̂ = ∞`, matching the reference treatment of unsmoothable tails.
    pub fn from_log_lik(matrix: &LogLikMatrix) -> Result<Self, ScoringError> {
        if matrix.is_empty() {
            return Err(ScoringError::EmptyMatrix);
        }
        let s = matrix.n_draws();
        let n = matrix.n_obs();

        let mut pointwise = Vec::with_capacity(n);
        let mut pareto_k = Vec::with_capacity(n);
        let mut p_loo = 0.0;

        for obs in 0..n {
            let ll = matrix.column(obs);
            if let Some(draw) = ll.iter().position(|v| !v.is_finite()) {
                return Err(ScoringError::NonFinite { obs, draw });
            }
            let (elpd_i, khat) = smoothed_elpd(ll, s);
            let lpd_i = log_sum_exp(ll) - (s as f64).ln();
            p_loo += lpd_i - elpd_i;
            pointwise.push(elpd_i);
            pareto_k.push(khat);
        }

        let elpd = pointwise.iter().sum::<f64>();
        let se = sample_sd(&pointwise) * (n as f64).sqrt();
        let flagged = pareto_k
            .iter()
            .filter(|&&k| k > PARETO_K_THRESHOLD)
            .count();

        Ok(LooScore {
            elpd,
            se,
            p_loo,
            pointwise,
            pareto_k,
            flagged,
        })
    }
}

/// LOO expected log predictive density for one observation, plus the Pareto
/// shape of its importance-weight tail.
fn smoothed_elpd(ll: &[f64], s: usize) -> (f64, f64) {
    // Importance ratios are 1/p; shift so the largest log-weight is zero.
    let mut lw: Vec<f64> = ll.iter().map(|&v| -v).collect();
    let shift = lw.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    for w in &mut lw {
        *w -= shift;
    }

    let m = tail_length(s);
    let khat = if m >= MIN_TAIL && s > m {
        smooth_tail(&mut lw, m)
    } else {
        f64::INFINITY
    };

    // Smoothed tail quantiles can exceed the largest raw weight; truncate.
    for w in &mut lw {
        if *w > 0.0 {
            *w = 0.0;
        }
    }

    let norm = log_sum_exp(&lw);
    let weighted: Vec<f64> = lw.iter().zip(ll).map(|(w, &v)| w - norm + v).collect();
    (log_sum_exp(&weighted), khat)
}

/// Fit a generalized Pareto to the `m` largest weights and replace them with
/// order-statistic quantiles of the fit. Returns the fitted shape, or `∞`
/// when the tail is flat or the fit is unusable.
fn smooth_tail(lw: &mut [f64], m: usize) -> f64 {
    let s = lw.len();
    let mut order: Vec<usize> = (0..s).collect();
    order.sort_by(|&a, &b| lw[a].partial_cmp(&lw[b]).unwrap_or(std::cmp::Ordering::Equal));
    let tail = &order[s - m..];

    // A flat tail carries no shape information.
    if lw[tail[m - 1]] - lw[tail[0]] < f64::EPSILON / 100.0 {
        return f64::INFINITY;
    }

    let cutoff = lw[order[s - m - 1]];
    let exp_cutoff = cutoff.exp();
    let mut exceedances: Vec<f64> = tail.iter().map(|&j| lw[j].exp() - exp_cutoff).collect();
    let fit = gpd_fit(&mut exceedances);
    if !(fit.k.is_finite() && fit.sigma.is_finite() && fit.sigma > 0.0) {
        return f64::INFINITY;
    }

    for (i, &j) in tail.iter().enumerate() {
        let p = (i as f64 + 0.5) / m as f64;
        lw[j] = (gpd_quantile(p, fit.k, fit.sigma) + exp_cutoff).ln();
    }
    fit.k
}
