//! Ranking scored models by expected predictive performance.

use serde::Serialize;

use crate::domain::{LooScore, RunReport};
use crate::error::ScoringError;
use crate::math::sample_sd;

/// Difference in elpd between two models, with its paired standard error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ElpdDiff {
    pub diff: f64,
    pub se: f64,
}

/// `a` minus `b`, with the standard error of the pointwise differences.
///
/// Pairing matters: the pointwise contributions of two models of the same
/// data are strongly correlated, so the paired se is much smaller than the
/// individual ses suggest and is the right yardstick for "within one se".
pub fn elpd_diff(a: &LooScore, b: &LooScore) -> Result<ElpdDiff, ScoringError> {
    if a.pointwise.len() != b.pointwise.len() {
        return Err(ScoringError::PointwiseMismatch {
            left: a.pointwise.len(),
            right: b.pointwise.len(),
        });
    }
    let diffs: Vec<f64> = a
        .pointwise
        .iter()
        .zip(&b.pointwise)
        .map(|(x, y)| x - y)
        .collect();
    Ok(ElpdDiff {
        diff: a.elpd - b.elpd,
        se: sample_sd(&diffs) * (diffs.len() as f64).sqrt(),
    })
}

/// One line of the comparison table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub name: String,
    pub elpd: f64,
    pub se: f64,
    pub elpd_diff: f64,
    pub se_diff: f64,
    pub p_loo: f64,
    pub flagged: usize,
}

/// Scored models ordered best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    rows: Vec<ComparisonRow>,
}

impl Comparison {
    pub fn rows(&self) -> &[ComparisonRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn best(&self) -> Option<&ComparisonRow> {
        self.rows.first()
    }
}

/// Rank models by elpd, best first. Ties keep input order, and every row's
/// difference is taken against the winner, so the top row reads 0 ± 0.
pub fn rank(scored: &[(&str, &LooScore)]) -> Result<Comparison, ScoringError> {
    let mut order: Vec<usize> = (0..scored.len()).collect();
    order.sort_by(|&a, &b| {
        scored[b]
            .1
            .elpd
            .partial_cmp(&scored[a].1.elpd)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut rows = Vec::with_capacity(scored.len());
    if let Some(&best_idx) = order.first() {
        let best = scored[best_idx].1;
        for &i in &order {
            let (name, score) = scored[i];
            let against_best = elpd_diff(score, best)?;
            rows.push(ComparisonRow {
                name: name.to_string(),
                elpd: score.elpd,
                se: score.se,
                elpd_diff: against_best.diff,
                se_diff: against_best.se,
                p_loo: score.p_loo,
                flagged: score.flagged,
            });
        }
    }
    Ok(Comparison { rows })
}

impl RunReport {
    /// Comparison table over every scored spec, ranked best first.
    pub fn comparison(&self) -> Result<Comparison, ScoringError> {
        let scored: Vec<(&str, &LooScore)> =
            self.scored().map(|(name, _, loo)| (name, loo)).collect();
        rank(&scored)
    }
}
