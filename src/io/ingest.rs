//! CSV ingest.
//!
//! Turns a flat CSV into a [`Dataset`]: one named response column, an
//! optional trials column, and every remaining column as a covariate.
//!
//! Design goals:
//! - **Strict cells**: a malformed value aborts the load with its line and
//!   column. Rows are never dropped silently — a posterior fitted to a
//!   quietly shrunken dataset answers a different question.
//! - **Deterministic behavior**: covariates keep their header order.

use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::domain::Dataset;
use crate::error::DataError;

/// What the loader actually read, for logs and reports.
#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub rows_read: usize,
    pub n_obs: usize,
    pub covariates: Vec<String>,
}

/// Load a dataset from CSV. Column matching is case-insensitive.
pub fn load_dataset(
    path: &Path,
    response: &str,
    trials: Option<&str>,
) -> Result<(Dataset, IngestSummary), DataError> {
    let file = File::open(path).map_err(|source| DataError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    let names: Vec<String> = headers.iter().map(normalize_header_name).collect();

    let response_idx = find_column(&names, response)?;
    let trials_idx = trials.map(|name| find_column(&names, name)).transpose()?;

    let mut response_vals = Vec::new();
    let mut trials_vals = Vec::new();
    let mut covariate_cols: Vec<(String, usize, Vec<f64>)> = names
        .iter()
        .enumerate()
        .filter(|&(idx, _)| idx != response_idx && Some(idx) != trials_idx)
        .map(|(idx, name)| (name.clone(), idx, Vec::new()))
        .collect();

    let mut rows_read = 0usize;
    for (idx, record) in reader.records().enumerate() {
        // +2: records start on the line after the header, and CSV line
        // numbers are 1-based.
        let line = idx + 2;
        let record = record?;
        rows_read += 1;

        response_vals.push(parse_cell(&record, response_idx, line, &names)?);
        if let Some(t_idx) = trials_idx {
            trials_vals.push(parse_trials(&record, t_idx, line, &names)?);
        }
        for (_, col_idx, values) in &mut covariate_cols {
            values.push(parse_cell(&record, *col_idx, line, &names)?);
        }
    }

    if response_vals.is_empty() {
        return Err(DataError::Empty);
    }

    let mut dataset = Dataset::new(response_vals);
    let mut covariates = Vec::with_capacity(covariate_cols.len());
    for (name, _, values) in covariate_cols {
        covariates.push(name.clone());
        dataset = dataset.with_covariate(name, values);
    }
    if trials_idx.is_some() {
        dataset = dataset.with_trials(trials_vals);
    }

    let summary = IngestSummary {
        rows_read,
        n_obs: dataset.len(),
        covariates,
    };
    Ok((dataset, summary))
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes carry a UTF-8 BOM on the first header;
    // without stripping it the column appears missing.
    name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase()
}

fn find_column(names: &[String], wanted: &str) -> Result<usize, DataError> {
    let key = wanted.to_ascii_lowercase();
    names
        .iter()
        .position(|n| *n == key)
        .ok_or_else(|| DataError::MissingColumn {
            name: wanted.to_string(),
        })
}

fn parse_cell(
    record: &StringRecord,
    idx: usize,
    line: usize,
    names: &[String],
) -> Result<f64, DataError> {
    let raw = record.get(idx).unwrap_or("");
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(DataError::BadCell {
            line,
            column: names[idx].clone(),
            value: raw.to_string(),
        }),
    }
}

fn parse_trials(
    record: &StringRecord,
    idx: usize,
    line: usize,
    names: &[String],
) -> Result<u64, DataError> {
    let raw = record.get(idx).unwrap_or("");
    raw.parse::<u64>().map_err(|_| DataError::BadTrials {
        line,
        column: names[idx].clone(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("loocmp-ingest-{name}-{}.csv", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_response_trials_and_covariates() {
        let path = write_temp("ok", "y,n,dose\n39,674,0.5\n22,680,1.5\n");
        let (data, summary) = load_dataset(&path, "y", Some("n")).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(data.response(), [39.0, 22.0]);
        assert_eq!(data.trials(), Some(&[674u64, 680][..]));
        assert_eq!(data.covariate("dose"), Some(&[0.5, 1.5][..]));
        assert_eq!(summary.rows_read, 2);
        assert_eq!(summary.covariates, ["dose"]);
    }

    #[test]
    fn bad_cells_report_line_and_column() {
        let path = write_temp("bad", "y,x\n1.0,2.0\n1.0,oops\n");
        let err = load_dataset(&path, "y", None).unwrap_err();
        fs::remove_file(&path).ok();

        match err {
            DataError::BadCell { line, column, value } => {
                assert_eq!(line, 3);
                assert_eq!(column, "x");
                assert_eq!(value, "oops");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_columns_and_empty_files_error() {
        let path = write_temp("nocol", "a,b\n1,2\n");
        assert!(matches!(
            load_dataset(&path, "y", None).unwrap_err(),
            DataError::MissingColumn { .. }
        ));
        fs::remove_file(&path).ok();

        let path = write_temp("empty", "y\n");
        assert!(matches!(
            load_dataset(&path, "y", None).unwrap_err(),
            DataError::Empty
        ));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn header_matching_is_case_insensitive() {
        let path = write_temp("case", "Y,Dose\n1,0.5\n0,1.5\n");
        let (data, summary) = load_dataset(&path, "y", None).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(data.response(), [1.0, 0.0]);
        assert_eq!(summary.covariates, ["dose"]);
    }

    #[test]
    fn non_integer_trials_rejected() {
        let path = write_temp("trials", "y,n\n3,10.5\n");
        let err = load_dataset(&path, "y", Some("n")).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, DataError::BadTrials { line: 2, .. }));
    }
}
