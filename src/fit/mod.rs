//! Posterior fitting.
//!
//! Responsibilities:
//!
//! - define the backend seam ([`Fitter`])
//! - provide the bundled adaptive random-walk backend
//! - compute convergence diagnostics (split R-hat, bulk/tail ESS, MCSE)

pub mod diagnostics;
pub mod fitter;
pub mod metropolis;

pub use diagnostics::summarize;
pub use fitter::*;
pub use metropolis::*;
