//! Design-matrix construction from a formula and a dataset.

use nalgebra::DMatrix;

use crate::domain::{Dataset, Formula};
use crate::error::InvalidSpec;

/// Column labels in design order: the intercept first, then formula terms.
pub fn design_columns(formula: &Formula) -> Vec<String> {
    let mut names = Vec::with_capacity(formula.column_count());
    if formula.intercept() {
        names.push("intercept".to_string());
    }
    names.extend(formula.terms().iter().cloned());
    names
}

/// Build the n × p design matrix.
///
/// Fails with `UnknownCovariate` when a formula term has no dataset column;
/// `spec_name` only feeds that error message.
pub fn design_matrix(
    formula: &Formula,
    dataset: &Dataset,
    spec_name: &str,
) -> Result<DMatrix<f64>, InvalidSpec> {
    let n = dataset.len();
    let p = formula.column_count();
    let mut x = DMatrix::<f64>::zeros(n, p);

    let mut col = 0;
    if formula.intercept() {
        for i in 0..n {
            x[(i, col)] = 1.0;
        }
        col += 1;
    }
    for term in formula.terms() {
        let values = dataset
            .covariate(term)
            .ok_or_else(|| InvalidSpec::UnknownCovariate {
                spec: spec_name.to_string(),
                name: term.clone(),
            })?;
        for (i, &v) in values.iter().enumerate() {
            x[(i, col)] = v;
        }
        col += 1;
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intercept_only_is_a_column_of_ones() {
        let data = Dataset::new(vec![1.0, 0.0, 1.0]);
        let f = Formula::parse("1").unwrap();
        let x = design_matrix(&f, &data, "m").unwrap();
        assert_eq!(x.nrows(), 3);
        assert_eq!(x.ncols(), 1);
        assert!(x.iter().all(|&v| v == 1.0));
        assert_eq!(design_columns(&f), ["intercept"]);
    }

    #[test]
    fn covariates_fill_in_formula_order() {
        let data = Dataset::new(vec![0.0, 1.0])
            .with_covariate("x", vec![2.0, 3.0])
            .with_covariate("z", vec![-1.0, 1.0]);
        let f = Formula::parse("z + x").unwrap();
        let x = design_matrix(&f, &data, "m").unwrap();
        assert_eq!(design_columns(&f), ["intercept", "z", "x"]);
        assert_eq!(x[(0, 0)], 1.0);
        assert_eq!(x[(0, 1)], -1.0);
        assert_eq!(x[(1, 2)], 3.0);
    }

    #[test]
    fn unknown_covariate_is_rejected() {
        let data = Dataset::new(vec![0.0, 1.0]).with_covariate("x", vec![2.0, 3.0]);
        let f = Formula::parse("x9").unwrap();
        let err = design_matrix(&f, &data, "oops").unwrap_err();
        assert!(matches!(
            err,
            InvalidSpec::UnknownCovariate { ref spec, ref name } if spec == "oops" && name == "x9"
        ));
    }
}
