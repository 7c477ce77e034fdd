//! Small numeric helpers shared across scoring and diagnostics.

/// `ln(Σ exp(v))` computed with the usual max-shift for stability.
///
/// Returns `-inf` for an empty slice (the log of an empty sum).
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        // Empty input or all -inf; +inf and NaN propagate naturally below.
        return max;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n − 1 denominator). Zero for fewer than 2 values.
pub fn sample_sd(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Linear-interpolation quantile of an ascending-sorted slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let idx = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = (idx.ceil() as usize).min(sorted.len() - 1);
    let frac = idx - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Sort a copy and take a quantile. Convenience for small vectors.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    quantile_sorted(&sorted, q)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sum_exp_matches_naive_on_small_values() {
        let v: [f64; 3] = [0.1, -0.4, 1.2];
        let naive = (v.iter().map(|x| x.exp()).sum::<f64>()).ln();
        assert!((log_sum_exp(&v) - naive).abs() < 1e-12);
    }

    #[test]
    fn log_sum_exp_is_stable_under_large_offsets() {
        let v = [-1000.0, -1000.5];
        let expected = -1000.0 + (1.0 + (-0.5f64).exp()).ln();
        assert!((log_sum_exp(&v) - expected).abs() < 1e-12);
    }

    #[test]
    fn log_sum_exp_of_empty_is_neg_infinity() {
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
    }

    #[test]
    fn sample_sd_handles_short_inputs() {
        assert_eq!(sample_sd(&[]), 0.0);
        assert_eq!(sample_sd(&[3.0]), 0.0);
        // sd of [1, 3] is sqrt(2)
        assert!((sample_sd(&[1.0, 3.0]) - 2.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn quantile_interpolates_between_order_stats() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&v, 0.0) - 1.0).abs() < 1e-12);
        assert!((quantile(&v, 1.0) - 4.0).abs() < 1e-12);
        assert!((quantile(&v, 0.5) - 2.5).abs() < 1e-12);
    }
}
