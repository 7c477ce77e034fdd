//! JSON export of a comparison run.
//!
//! Everything the terminal report shows is also written here, plus the
//! pointwise detail the text report summarizes away, so downstream tooling
//! can re-rank or re-plot without re-fitting.

use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::domain::RunReport;
use crate::error::DataError;
use crate::loo::Comparison;

#[derive(Serialize)]
struct ReportFile<'a> {
    tool: &'static str,
    report: &'a RunReport,
    /// Present only when at least two specs scored.
    comparison: Option<Comparison>,
}

/// Serialize the full run report (entries, diagnostics, LOO scores, and the
/// ranking when one exists) as pretty-printed JSON.
pub fn write_report_json(path: &Path, report: &RunReport) -> Result<(), DataError> {
    let payload = ReportFile {
        tool: "loocmp",
        report,
        comparison: report.comparison().ok().filter(|c| c.len() >= 2),
    };
    let file = File::create(path).map_err(|source| DataError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_writer_pretty(file, &payload)?;
    Ok(())
}
