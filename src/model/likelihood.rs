//! Per-family log-density terms.
//!
//! Everything is written in log space with softplus-based forms for the
//! binary families, so linear predictors far into either tail stay finite
//! instead of saturating through `ln(0)`. `ln_gamma` supplies the binomial
//! coefficient and the Student-t normalizer.

use std::f64::consts::PI;

use statrs::function::gamma::ln_gamma;

/// `ln(1 + e^x)` without overflow for large |x|.
pub fn softplus(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

/// Logistic function, stable in both tails.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `ln C(n, k)` via log-gamma.
pub fn ln_choose(n: f64, k: f64) -> f64 {
    ln_gamma(n + 1.0) - ln_gamma(k + 1.0) - ln_gamma(n - k + 1.0)
}

/// Binomial log-pmf with the success probability on the logit scale.
///
/// Covers Bernoulli with `trials = 1` (the binomial coefficient is then 0).
pub fn binomial_logit_lpmf(successes: f64, trials: f64, eta: f64) -> f64 {
    // ln p = -softplus(-eta), ln(1-p) = -softplus(eta); both always finite.
    let log_p = -softplus(-eta);
    let log_q = -softplus(eta);
    ln_choose(trials, successes) + successes * log_p + (trials - successes) * log_q
}

/// Binomial log-pmf with the success probability on the natural scale.
pub fn binomial_lpmf(successes: f64, trials: f64, p: f64) -> f64 {
    let mut lp = ln_choose(trials, successes);
    // Skip zero-count terms so p at the edge of (0,1) cannot produce 0·(-inf).
    if successes > 0.0 {
        lp += successes * p.ln();
    }
    if trials - successes > 0.0 {
        lp += (trials - successes) * (-p).ln_1p();
    }
    lp
}

pub fn normal_lpdf(y: f64, mu: f64, sigma: f64) -> f64 {
    let z = (y - mu) / sigma;
    -0.5 * (2.0 * PI).ln() - sigma.ln() - 0.5 * z * z
}

pub fn student_t_lpdf(y: f64, mu: f64, sigma: f64, df: f64) -> f64 {
    let z = (y - mu) / sigma;
    ln_gamma((df + 1.0) / 2.0)
        - ln_gamma(df / 2.0)
        - 0.5 * (df * PI).ln()
        - sigma.ln()
        - 0.5 * (df + 1.0) * (z * z / df).ln_1p()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softplus_matches_naive_and_saturates_linearly() {
        for x in [-3.0, -0.5, 0.0, 0.5, 3.0] {
            let naive = (1.0 + f64::exp(x)).ln();
            assert!((softplus(x) - naive).abs() < 1e-12);
        }
        assert!((softplus(800.0) - 800.0).abs() < 1e-9);
        assert!(softplus(-800.0).abs() < 1e-12);
    }

    #[test]
    fn sigmoid_midpoint_and_tails() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-15);
        assert!(sigmoid(40.0) > 1.0 - 1e-15);
        assert!(sigmoid(-40.0) < 1e-15);
    }

    #[test]
    fn ln_choose_known_value() {
        assert!((ln_choose(10.0, 3.0) - 120.0f64.ln()).abs() < 1e-10);
        assert!(ln_choose(1.0, 0.0).abs() < 1e-12);
        assert!(ln_choose(1.0, 1.0).abs() < 1e-12);
    }

    #[test]
    fn bernoulli_logit_known_value() {
        // trials = 1, eta = 0 gives p = 0.5 either way.
        let half = 0.5f64.ln();
        assert!((binomial_logit_lpmf(1.0, 1.0, 0.0) - half).abs() < 1e-12);
        assert!((binomial_logit_lpmf(0.0, 1.0, 0.0) - half).abs() < 1e-12);
    }

    #[test]
    fn binomial_pmf_sums_to_one() {
        let (n, p) = (3.0, 0.3);
        let total: f64 = (0..=3).map(|y| binomial_lpmf(y as f64, n, p).exp()).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn natural_and_logit_scales_agree() {
        let eta = -1.3;
        let p = sigmoid(eta);
        let a = binomial_lpmf(2.0, 7.0, p);
        let b = binomial_logit_lpmf(2.0, 7.0, eta);
        assert!((a - b).abs() < 1e-10);
    }

    #[test]
    fn normal_lpdf_standard_at_zero() {
        assert!((normal_lpdf(0.0, 0.0, 1.0) - (-0.9189385332046727)).abs() < 1e-12);
    }

    #[test]
    fn student_t_matches_cauchy_and_limits_to_normal() {
        // df = 1 is Cauchy: density 1/pi at the center.
        let cauchy = student_t_lpdf(0.0, 0.0, 1.0, 1.0);
        assert!((cauchy - (1.0 / PI).ln()).abs() < 1e-12);
        // Large df approaches the Gaussian.
        let t = student_t_lpdf(0.7, 0.0, 1.0, 1e6);
        let n = normal_lpdf(0.7, 0.0, 1.0);
        assert!((t - n).abs() < 1e-5);
    }
}
