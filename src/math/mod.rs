//! Mathematical utilities: log-space reductions and the generalized Pareto fit.

pub mod gpd;
pub mod stats;

pub use gpd::*;
pub use stats::*;
