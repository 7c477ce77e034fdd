//! Formula parsing: which covariates enter the linear predictor.
//!
//! The accepted grammar is the additive subset of the usual regression
//! formula notation:
//!
//! - `"1"` — intercept only
//! - `"1 + x + z"` or `"x + z"` — intercept plus named covariates
//! - `"0 + x"` / `"-1 + x"` — named covariates with the intercept suppressed
//! - an optional `response ~` prefix is accepted and discarded; the dataset
//!   names the response column, so the left-hand side carries no information
//!
//! Interactions, transforms, and nesting are not part of the grammar.

use std::fmt;

use serde::Serialize;

use crate::error::InvalidSpec;

/// Parsed right-hand side of a model formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Formula {
    intercept: bool,
    terms: Vec<String>,
}

impl Formula {
    /// Parse a formula string.
    pub fn parse(text: &str) -> Result<Self, InvalidSpec> {
        let malformed = |reason: &str| InvalidSpec::MalformedFormula {
            formula: text.to_string(),
            reason: reason.to_string(),
        };

        // Drop an optional "lhs ~" prefix.
        let rhs = match text.split_once('~') {
            Some((_, rhs)) => rhs,
            None => text,
        };
        if rhs.contains('~') {
            return Err(malformed("more than one '~'"));
        }

        let mut intercept: Option<bool> = None;
        let mut terms: Vec<String> = Vec::new();

        for raw_token in rhs.split('+') {
            let token = raw_token.trim();
            match token {
                "" => return Err(malformed("empty term")),
                "1" => {
                    if intercept == Some(false) {
                        return Err(malformed("both '1' and '0'/'-1' present"));
                    }
                    if intercept == Some(true) {
                        return Err(malformed("duplicate intercept term"));
                    }
                    intercept = Some(true);
                }
                "0" | "-1" => {
                    if intercept == Some(true) {
                        return Err(malformed("both '1' and '0'/'-1' present"));
                    }
                    if intercept == Some(false) {
                        return Err(malformed("duplicate intercept suppression"));
                    }
                    intercept = Some(false);
                }
                name => {
                    if !is_identifier(name) {
                        return Err(malformed(&format!("invalid term '{name}'")));
                    }
                    if terms.iter().any(|t| t == name) {
                        return Err(malformed(&format!("duplicate term '{name}'")));
                    }
                    terms.push(name.to_string());
                }
            }
        }

        // Intercept is implied unless suppressed.
        let intercept = intercept.unwrap_or(true);
        if !intercept && terms.is_empty() {
            return Err(malformed("no parameters: intercept suppressed and no terms"));
        }

        Ok(Self { intercept, terms })
    }

    pub fn intercept(&self) -> bool {
        self.intercept
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_intercept_only(&self) -> bool {
        self.intercept && self.terms.is_empty()
    }

    /// Number of design-matrix columns this formula produces.
    pub fn column_count(&self) -> usize {
        usize::from(self.intercept) + self.terms.len()
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<&str> = Vec::with_capacity(1 + self.terms.len());
        parts.push(if self.intercept { "1" } else { "0" });
        for t in &self.terms {
            parts.push(t);
        }
        write!(f, "{}", parts.join(" + "))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intercept_only() {
        let f = Formula::parse("1").unwrap();
        assert!(f.is_intercept_only());
        assert_eq!(f.column_count(), 1);
        assert_eq!(f.to_string(), "1");
    }

    #[test]
    fn intercept_is_implied() {
        let f = Formula::parse("x + z").unwrap();
        assert!(f.intercept());
        assert_eq!(f.terms(), ["x", "z"]);
        assert_eq!(f.to_string(), "1 + x + z");
    }

    #[test]
    fn explicit_intercept_and_terms() {
        let f = Formula::parse("1 + dose").unwrap();
        assert!(f.intercept());
        assert_eq!(f.terms(), ["dose"]);
    }

    #[test]
    fn suppressed_intercept() {
        for text in ["0 + x", "-1 + x"] {
            let f = Formula::parse(text).unwrap();
            assert!(!f.intercept());
            assert_eq!(f.terms(), ["x"]);
            assert_eq!(f.to_string(), "0 + x");
        }
    }

    #[test]
    fn response_prefix_is_discarded() {
        let f = Formula::parse("y ~ 1 + x").unwrap();
        assert!(f.intercept());
        assert_eq!(f.terms(), ["x"]);
    }

    #[test]
    fn rejects_malformed_input() {
        for text in ["", "x +", "+ x", "1 + + x", "0", "-1", "1 + 1", "x + x", "a ~ b ~ c", "2x"] {
            assert!(Formula::parse(text).is_err(), "accepted {text:?}");
        }
    }
}
