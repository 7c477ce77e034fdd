//! `loo-compare` library crate.
//!
//! The binary (`loocmp`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the runner is embeddable (notebooks, services, other CLIs)
//! - fitting backends can be swapped behind the `Fitter` trait
//!
//! The short version of the pipeline: a [`domain::Dataset`] plus a batch of
//! [`domain::ModelSpec`]s go into [`runner::Runner::run`]; each spec is fitted
//! (in parallel), scored with PSIS-LOO, and the specs come back ranked by
//! expected out-of-sample predictive performance.

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod loo;
pub mod math;
pub mod model;
pub mod report;
pub mod runner;
