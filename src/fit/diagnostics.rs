//! Convergence diagnostics for multi-chain draws.
//!
//! Split R-hat and rank-normalized bulk/tail ESS follow Vehtari et al. (2021),
//! "Rank-normalization, folding, and localization: an improved R-hat for
//! assessing convergence of MCMC". All quantities are computed from the
//! constrained-scale draws the fitter stores, laid out as
//! `chains[chain][draw][param]`.

use crate::domain::{FitDiagnostics, ParamSummary};
use crate::math::{mean, quantile_sorted, sample_sd};

/// Summarize every parameter of a posterior sample.
pub fn summarize(
    param_names: &[String],
    chains: &[Vec<Vec<f64>>],
    divergences: usize,
    max_treedepth_hits: usize,
) -> FitDiagnostics {
    let params = param_names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let series: Vec<Vec<f64>> = chains
                .iter()
                .map(|chain| chain.iter().map(|draw| draw[idx]).collect())
                .collect();
            summarize_param(name, &series)
        })
        .collect();

    FitDiagnostics {
        divergences,
        max_treedepth_hits,
        params,
    }
}

fn summarize_param(name: &str, series: &[Vec<f64>]) -> ParamSummary {
    let pooled: Vec<f64> = series.iter().flatten().copied().collect();
    let mean = mean(&pooled);
    let sd = sample_sd(&pooled);
    let ess_bulk = bulk_ess(series);
    let ess_tail = tail_ess(series);
    let rhat = split_rhat(series);
    let mcse_mean = if ess_bulk > 0.0 {
        sd / ess_bulk.sqrt()
    } else {
        f64::NAN
    };

    ParamSummary {
        name: name.to_string(),
        mean,
        sd,
        mcse_mean,
        ess_bulk,
        ess_tail,
        rhat,
    }
}

/// Split each chain in half so a within-chain trend shows up as
/// between-chain disagreement.
fn half_chains(series: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut halves = Vec::with_capacity(series.len() * 2);
    for chain in series {
        let mid = chain.len() / 2;
        halves.push(chain[..mid].to_vec());
        halves.push(chain[mid..].to_vec());
    }
    halves
}

fn split_rhat(series: &[Vec<f64>]) -> f64 {
    let halves = half_chains(series);
    let m = halves.len();
    let len = halves.first().map_or(0, Vec::len);
    if m < 2 || len < 2 {
        return f64::NAN;
    }
    let m = m as f64;
    let n = len as f64;

    let chain_means: Vec<f64> = halves.iter().map(|c| mean(c)).collect();
    let grand = mean(&chain_means);
    let between = n / (m - 1.0)
        * chain_means
            .iter()
            .map(|&cm| (cm - grand).powi(2))
            .sum::<f64>();
    let within = halves
        .iter()
        .map(|c| {
            let cm = mean(c);
            c.iter().map(|&x| (x - cm).powi(2)).sum::<f64>() / (n - 1.0)
        })
        .sum::<f64>()
        / m;

    // A flat trace has no within-chain scale to compare against.
    if within < 1e-30 {
        return f64::NAN;
    }
    ((n - 1.0) / n + between / (n * within)).sqrt()
}

/// Bulk ESS: ESS of the rank-normalized draws.
fn bulk_ess(series: &[Vec<f64>]) -> f64 {
    ess_autocorr(&rank_normal_scores(series))
}

/// Tail ESS: the smaller of the ESS of the 5% and 95% tail indicators.
fn tail_ess(series: &[Vec<f64>]) -> f64 {
    let mut pooled: Vec<f64> = series.iter().flatten().copied().collect();
    if pooled.is_empty() {
        return f64::NAN;
    }
    pooled.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let q05 = quantile_sorted(&pooled, 0.05);
    let q95 = quantile_sorted(&pooled, 0.95);

    let indicator = |hit: &dyn Fn(f64) -> bool| -> Vec<Vec<f64>> {
        series
            .iter()
            .map(|chain| {
                chain
                    .iter()
                    .map(|&x| if hit(x) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect()
    };

    let lower = ess_autocorr(&indicator(&|x| x <= q05));
    let upper = ess_autocorr(&indicator(&|x| x >= q95));
    lower.min(upper)
}

/// ESS from pooled autocorrelations of the split chains, truncated by
/// Geyer's initial positive sequence.
fn ess_autocorr(series: &[Vec<f64>]) -> f64 {
    let halves = half_chains(series);
    let m = halves.len();
    let len = halves.first().map_or(0, Vec::len);
    if m == 0 || len < 2 {
        return f64::NAN;
    }
    let m_f = m as f64;
    let n_f = len as f64;

    let chain_means: Vec<f64> = halves.iter().map(|c| mean(c)).collect();
    let within = halves
        .iter()
        .map(|c| {
            let cm = mean(c);
            c.iter().map(|&x| (x - cm).powi(2)).sum::<f64>() / (n_f - 1.0)
        })
        .sum::<f64>()
        / m_f;
    if within < 1e-30 {
        return f64::NAN;
    }

    // Autocovariance at each lag, pooled across chains.
    let mut rho = Vec::with_capacity(len);
    for lag in 0..len {
        let mut gamma = 0.0;
        for (chain, &cm) in halves.iter().zip(&chain_means) {
            let limit = chain.len().saturating_sub(lag);
            for t in 0..limit {
                gamma += (chain[t] - cm) * (chain[t + lag] - cm);
            }
        }
        gamma /= m_f * (n_f - 1.0);
        rho.push(1.0 - (within - gamma) / within);
    }

    // Geyer pairs (rho[2k] + rho[2k+1]) from lag zero, truncated at the
    // first negative pair: tau = -1 + 2 * (pair sum), so white noise sits
    // near tau = 1.
    let mut pair_sum = 0.0;
    let mut lag = 0;
    while lag + 1 < rho.len() {
        let pair = rho[lag] + rho[lag + 1];
        if pair < 0.0 {
            break;
        }
        pair_sum += pair;
        lag += 2;
    }
    let tau = (2.0 * pair_sum - 1.0).max(1.0 / (m_f * n_f));
    m_f * n_f / tau
}

/// Replace draws with normal scores of their pooled ranks (ties averaged).
fn rank_normal_scores(series: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let total: usize = series.iter().map(Vec::len).sum();
    let mut indexed: Vec<(f64, usize, usize)> = Vec::with_capacity(total);
    for (ci, chain) in series.iter().enumerate() {
        for (di, &v) in chain.iter().enumerate() {
            indexed.push((v, ci, di));
        }
    }
    indexed.sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; total];
    let mut i = 0;
    while i < total {
        let mut j = i;
        while j < total && indexed[j].0 == indexed[i].0 {
            j += 1;
        }
        // Ties share the average of the ranks they span.
        let shared = (i + j + 1) as f64 / 2.0;
        for rank in ranks.iter_mut().take(j).skip(i) {
            *rank = shared;
        }
        i = j;
    }

    let total_f = total as f64;
    let mut scores: Vec<Vec<f64>> = series.iter().map(|c| vec![0.0; c.len()]).collect();
    for (pos, &(_, ci, di)) in indexed.iter().enumerate() {
        let p = (ranks[pos] - 0.375) / (total_f + 0.25);
        scores[ci][di] = normal_quantile(p);
    }
    scores
}

/// Beasley-Springer-Moro approximation to the standard normal quantile.
fn normal_quantile(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let tail = p.min(1.0 - p);
    let t = (-2.0 * tail.ln()).sqrt();
    let num = 2.515517 + t * (0.802853 + t * 0.010328);
    let den = 1.0 + t * (1.432788 + t * (0.189269 + t * 0.001308));
    let v = t - num / den;
    if p < 0.5 { -v } else { v }
}
