//! The fitting seam.
//!
//! The runner talks to posterior samplers only through [`Fitter`], so the
//! bundled random-walk backend can be swapped for any other engine (an
//! external sampler, a conjugate shortcut, a test stub) without touching
//! scoring or ranking. Implementations must be callable from worker threads.

use crate::domain::{FitResult, SamplingConfig};
use crate::error::SamplerError;
use crate::model::Model;

/// A posterior sampling backend.
pub trait Fitter: Send + Sync {
    /// Backend name for logs and reports.
    fn name(&self) -> &str;

    /// Draw from the posterior of `model`.
    ///
    /// `spec_name` identifies the spec in the returned [`FitResult`] and in
    /// error messages. Implementations seed from `config.seed` so that a
    /// fixed seed reproduces draws bit for bit, and report fits that cannot
    /// produce draws as [`SamplerError`] rather than panicking.
    fn fit(
        &self,
        spec_name: &str,
        model: &Model,
        config: &SamplingConfig,
    ) -> Result<FitResult, SamplerError>;
}
