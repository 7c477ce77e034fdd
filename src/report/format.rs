//! Formatted terminal output for comparison runs.
//!
//! All string building lives here, keeping the scoring and fitting code free
//! of presentation concerns and any future output change in one file.

use crate::domain::{FitResult, RunReport, SpecOutcome};
use crate::loo::{Comparison, PARETO_K_THRESHOLD};

/// Format the full run report: per-spec outcomes plus the ranked table.
pub fn format_run_report(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str("=== loocmp - PSIS-LOO model comparison ===\n");
    out.push_str(&format!("Specs: {}\n", report.len()));

    out.push_str("\nPer-spec outcomes:\n");
    for entry in report.entries() {
        let line = match &entry.outcome {
            SpecOutcome::Scored { loo, .. } => format!(
                "  {:<16} elpd={:>10.3} se={:>7.3} p_loo={:>7.3} flagged={}",
                truncate(&entry.name, 16),
                loo.elpd,
                loo.se,
                loo.p_loo,
                loo.flagged
            ),
            SpecOutcome::ScoringSkipped { reason, .. } => {
                format!("  {:<16} fitted, not scored ({reason})", truncate(&entry.name, 16))
            }
            SpecOutcome::FitFailed { error } => {
                format!("  {:<16} FAILED: {error}", truncate(&entry.name, 16))
            }
        };
        out.push_str(&line);
        out.push_str(&format!("  [{} ms]\n", entry.elapsed.as_millis()));
    }

    match report.comparison() {
        Ok(cmp) if cmp.len() >= 2 => {
            out.push('\n');
            out.push_str(&format_comparison(&cmp));
        }
        Ok(_) => {
            out.push_str("\n(fewer than two scored specs; no ranking)\n");
        }
        Err(e) => {
            out.push_str(&format!("\n(comparison unavailable: {e})\n"));
        }
    }

    let flagged = report.total_flagged();
    if flagged > 0 {
        out.push_str(&format!(
            "\nWarning: {flagged} observation(s) with Pareto k above {PARETO_K_THRESHOLD}; \
             the affected elpd estimates are unreliable.\n"
        ));
    }

    out
}

/// Format the ranked comparison table.
pub fn format_comparison(cmp: &Comparison) -> String {
    let mut out = String::new();

    out.push_str("Ranking (best first):\n");
    out.push_str(&format!(
        "{:<4} {:<16} {:>10} {:>8} {:>10} {:>9} {:>8} {:>8}\n",
        "rank", "model", "elpd", "se", "elpd_diff", "se_diff", "p_loo", "flagged"
    ));
    out.push_str(&format!("{:-<80}\n", ""));

    for (i, row) in cmp.rows().iter().enumerate() {
        out.push_str(&format!(
            "{:<4} {:<16} {:>10.3} {:>8.3} {:>10.3} {:>9.3} {:>8.3} {:>8}\n",
            i + 1,
            truncate(&row.name, 16),
            row.elpd,
            row.se,
            row.elpd_diff,
            row.se_diff,
            row.p_loo,
            row.flagged
        ));
    }

    out
}

/// Format one fitted spec: per-parameter posterior table plus convergence
/// warnings.
pub fn format_fit_summary(fit: &FitResult) -> String {
    let mut out = String::new();
    let diag = fit.diagnostics();

    out.push_str(&format!(
        "{}: {} chains, {} draws\n",
        fit.spec_name(),
        fit.n_chains(),
        fit.total_draws()
    ));
    out.push_str(&format!(
        "{:<12} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8}\n",
        "parameter", "mean", "sd", "mcse", "ess_bulk", "ess_tail", "rhat"
    ));
    out.push_str(&format!("{:-<76}\n", ""));

    for p in &diag.params {
        out.push_str(&format!(
            "{:<12} {:>10.4} {:>10.4} {:>10.5} {:>10} {:>10} {:>8.4}\n",
            truncate(&p.name, 12),
            p.mean,
            p.sd,
            p.mcse_mean,
            fmt_ess(p.ess_bulk),
            fmt_ess(p.ess_tail),
            p.rhat
        ));
    }

    if diag.divergences > 0 {
        out.push_str(&format!(
            "Warning: {} divergent transitions; results may be unreliable.\n",
            diag.divergences
        ));
    }
    if diag.max_treedepth_hits > 0 {
        out.push_str(&format!(
            "Warning: maximum tree depth hit {} times.\n",
            diag.max_treedepth_hits
        ));
    }
    let bad_rhat = diag
        .params
        .iter()
        .any(|p| p.rhat > 1.05 || !p.rhat.is_finite());
    if bad_rhat {
        out.push_str("Warning: some R-hat values exceed 1.05; chains may not have converged.\n");
    }
    let low_ess = diag
        .params
        .iter()
        .any(|p| p.ess_bulk < 400.0 || p.ess_tail < 400.0);
    if low_ess {
        out.push_str("Warning: some ESS values are below 400; consider more draws.\n");
    }

    out
}

fn fmt_ess(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "NaN".to_string()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
