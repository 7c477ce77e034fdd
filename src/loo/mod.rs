//! Model scoring and comparison.
//!
//! Responsibilities:
//!
//! - PSIS-LOO scores from a pointwise log-likelihood matrix ([`psis`])
//! - paired elpd differences and the ranked comparison table ([`compare`])

pub mod compare;
pub mod psis;

pub use compare::*;
pub use psis::*;
