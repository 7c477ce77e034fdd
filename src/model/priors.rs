//! Prior resolution, hyperparameter validation, and log-densities.

use crate::domain::Prior;
use crate::error::InvalidSpec;
use crate::model::likelihood::{normal_lpdf, student_t_lpdf};

/// What a parameter does in the likelihood; decides its default prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Lone success probability of an intercept-only binary model.
    Theta,
    Intercept,
    Slope,
    Sigma,
}

impl Role {
    /// Library default prior for this role.
    pub fn default_prior(self) -> Prior {
        match self {
            Role::Theta => Prior::Uniform {
                lower: 0.0,
                upper: 1.0,
            },
            Role::Intercept | Role::Slope => Prior::Normal { mu: 0.0, sigma: 2.5 },
            // Improper flat on sigma > 0; the log transform's Jacobian
            // supplies the density on the sampled scale.
            Role::Sigma => Prior::Flat,
        }
    }
}

/// Replace `Prior::Default` with the role's concrete default.
pub fn resolve(prior: Prior, role: Role) -> Prior {
    match prior {
        Prior::Default => role.default_prior(),
        other => other,
    }
}

/// Check hyperparameters; called once per parameter before any fit starts.
pub fn validate(prior: &Prior, spec: &str, param: &str) -> Result<(), InvalidSpec> {
    let fail = |reason: String| InvalidSpec::InvalidPrior {
        spec: spec.to_string(),
        param: param.to_string(),
        reason,
    };
    match *prior {
        Prior::Default | Prior::Flat => Ok(()),
        Prior::Normal { mu, sigma } => {
            if !mu.is_finite() {
                return Err(fail(format!("normal location {mu} is not finite")));
            }
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(fail(format!("normal scale {sigma} must be positive")));
            }
            Ok(())
        }
        Prior::StudentT { df, mu, sigma } => {
            if !(df.is_finite() && df > 0.0) {
                return Err(fail(format!("student-t degrees of freedom {df} must be positive")));
            }
            if !mu.is_finite() {
                return Err(fail(format!("student-t location {mu} is not finite")));
            }
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(fail(format!("student-t scale {sigma} must be positive")));
            }
            Ok(())
        }
        Prior::Uniform { lower, upper } => {
            if !(lower.is_finite() && upper.is_finite() && lower < upper) {
                return Err(fail(format!("uniform bounds [{lower}, {upper}] are not an interval")));
            }
            Ok(())
        }
    }
}

/// Log-density of a resolved prior at a constrained-scale value.
///
/// `Prior::Default` must be resolved before evaluation; it is treated as
/// flat here so an unresolved value cannot bias a posterior.
pub fn log_density(prior: &Prior, value: f64) -> f64 {
    match *prior {
        Prior::Default | Prior::Flat => 0.0,
        Prior::Normal { mu, sigma } => normal_lpdf(value, mu, sigma),
        Prior::StudentT { df, mu, sigma } => student_t_lpdf(value, mu, sigma, df),
        Prior::Uniform { lower, upper } => {
            if value >= lower && value <= upper {
                -(upper - lower).ln()
            } else {
                f64::NEG_INFINITY
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_by_role() {
        assert_eq!(
            resolve(Prior::Default, Role::Theta),
            Prior::Uniform { lower: 0.0, upper: 1.0 }
        );
        assert_eq!(
            resolve(Prior::Default, Role::Slope),
            Prior::Normal { mu: 0.0, sigma: 2.5 }
        );
        assert_eq!(resolve(Prior::Default, Role::Sigma), Prior::Flat);
        // Explicit priors pass through untouched.
        let explicit = Prior::Normal { mu: 1.0, sigma: 0.5 };
        assert_eq!(resolve(explicit, Role::Theta), explicit);
    }

    #[test]
    fn validate_rejects_bad_hyperparameters() {
        assert!(validate(&Prior::Normal { mu: 0.0, sigma: 0.0 }, "m", "b").is_err());
        assert!(validate(&Prior::Normal { mu: f64::NAN, sigma: 1.0 }, "m", "b").is_err());
        assert!(validate(&Prior::StudentT { df: -1.0, mu: 0.0, sigma: 1.0 }, "m", "b").is_err());
        assert!(validate(&Prior::Uniform { lower: 1.0, upper: 0.0 }, "m", "b").is_err());
        assert!(validate(&Prior::Uniform { lower: 0.0, upper: 1.0 }, "m", "b").is_ok());
        assert!(validate(&Prior::Flat, "m", "b").is_ok());
    }

    #[test]
    fn uniform_density_is_flat_inside_and_zero_outside() {
        let u = Prior::Uniform { lower: 0.0, upper: 2.0 };
        assert!((log_density(&u, 1.0) - (-2.0f64.ln())).abs() < 1e-12);
        assert_eq!(log_density(&u, 2.5), f64::NEG_INFINITY);
    }
}
